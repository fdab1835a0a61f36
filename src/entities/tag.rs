//! Tag entity - free-form labels attached to vouchers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tag database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    /// Unique identifier for the tag
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tag name, unique
    #[sea_orm(unique)]
    pub name: String,
}

/// A tag is assigned to many vouchers
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::voucher_tag::Entity")]
    VoucherTags,
}

impl Related<super::voucher_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoucherTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
