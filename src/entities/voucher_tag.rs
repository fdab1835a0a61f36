//! Voucher tag entity - assignment of a tag to a voucher.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Voucher tag database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voucher_tags")]
pub struct Model {
    /// Tagged voucher
    #[sea_orm(primary_key, auto_increment = false)]
    pub voucher_id: i64,
    /// Assigned tag
    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_id: i64,
}

/// Links one voucher and one tag
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
    #[sea_orm(
        belongs_to = "super::tag::Entity",
        from = "Column::TagId",
        to = "super::tag::Column::Id"
    )]
    Tag,
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tag.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
