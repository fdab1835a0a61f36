//! Sequence counter entity - last issued voucher sequence per fiscal year and fund sphere.
//!
//! Rows are created lazily on first use and only ever incremented. The
//! `(fiscal_year, sphere)` pair is unique.

use super::enums::FundSphere;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sequence counter database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sequence_counters")]
pub struct Model {
    /// Surrogate key
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Fiscal year of the sequence
    pub fiscal_year: i32,
    /// Fund sphere of the sequence
    pub sphere: FundSphere,
    /// Last issued sequence number
    pub last_seq_no: i32,
}

/// `SequenceCounter` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
