//! Audit log entity - append-only record of every mutation.
//!
//! Rows are inserted once and never updated or deleted. The auto-incrementing id
//! gives the commit order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    /// Unique identifier of the audit row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Who made the change, if known
    pub actor_id: Option<String>,
    /// Table-level name of the audited entity, e.g. `"voucher"`
    pub entity_type: String,
    /// Id of the changed row
    pub entity_id: i64,
    /// `CREATE`, `UPDATE`, `DELETE`, `REVERSE`, ...
    pub action: String,
    /// Structured before/after snapshot
    pub diff: Json,
    /// When the change was committed
    pub created_at: DateTimeUtc,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
