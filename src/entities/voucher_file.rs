//! Voucher file entity - metadata of a document stored by the attachment store.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Voucher file database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voucher_files")]
pub struct Model {
    /// Unique identifier for the file record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Voucher the file belongs to
    pub voucher_id: i64,
    /// Original file name
    pub file_name: String,
    /// MIME type, if known
    pub mime_type: Option<String>,
    /// Size in bytes
    pub size: i64,
    /// Location returned by the attachment store
    pub file_ref: String,
    /// When the file was stored
    pub created_at: DateTimeUtc,
}

/// Each file belongs to one voucher
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
