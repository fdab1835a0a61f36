//! Append-only audit trail.
//!
//! Every mutation writes one row inside the mutating transaction. Updates carry
//! complete before/after snapshots rather than changed columns, so history can
//! be read without replaying earlier rows.

use crate::{
    entities::{AuditLog, audit_log},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Entity type written for voucher rows.
pub const ENTITY_VOUCHER: &str = "voucher";

/// What happened to the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// Original voucher received its reversal link
    Reverse,
    /// Allocation rows of a voucher changed
    Allocate,
}

impl AuditAction {
    /// Value stored in the `action` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Reverse => "REVERSE",
            Self::Allocate => "ALLOCATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the `{"before": .., "after": ..}` payload. Absent sides are `null`.
pub fn snapshot_diff<B, A>(before: Option<&B>, after: Option<&A>) -> Result<Value>
where
    B: Serialize,
    A: Serialize,
{
    Ok(json!({
        "before": serde_json::to_value(before)?,
        "after": serde_json::to_value(after)?,
    }))
}

/// Appends one audit row.
pub async fn record<C>(
    db: &C,
    actor_id: Option<&str>,
    entity_type: &str,
    entity_id: i64,
    action: AuditAction,
    diff: Value,
) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    let row = audit_log::ActiveModel {
        actor_id: Set(actor_id.map(ToString::to_string)),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id),
        action: Set(action.as_str().to_string()),
        diff: Set(diff),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Audit rows for one entity in commit order.
pub async fn history<C>(db: &C, entity_type: &str, entity_id: i64) -> Result<Vec<audit_log::Model>>
where
    C: ConnectionTrait,
{
    AuditLog::find()
        .filter(audit_log::Column::EntityType.eq(entity_type))
        .filter(audit_log::Column::EntityId.eq(entity_id))
        .order_by_asc(audit_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
