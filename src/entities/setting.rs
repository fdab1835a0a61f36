//! Setting entity - key-value configuration pairs.
//! Holds runtime switches such as the period-lock cutoff and the
//! negative-earmark policy.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Setting database model - stores key-value configuration pairs
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    /// Unique identifier for the setting
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Configuration key (e.g., `"periodLock.closedUntil"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Configuration value stored as string
    pub value: String,
    /// When this configuration was last modified
    pub updated_at: DateTime,
}

/// `Setting` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
