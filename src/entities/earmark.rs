//! Earmark entity - a named pool of donor-restricted funds.
//!
//! `capital_cap` is a soft ceiling: it feeds the remaining-balance warning but
//! never blocks a booking.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Earmark database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "earmarks")]
pub struct Model {
    /// Unique identifier for the earmark
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short unique code
    #[sea_orm(unique)]
    pub code: String,
    /// Display name
    pub name: String,
    /// Inactive earmarks accept no new allocations
    pub is_active: bool,
    /// Starting capital; `None` counts as zero
    pub capital_cap: Option<Decimal>,
    /// First valid day
    pub start_date: Option<Date>,
    /// Last valid day
    pub end_date: Option<Date>,
    /// Reject vouchers dated outside the range
    pub enforce_date_range: bool,
}

/// Defines relationships between Earmark and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::earmark_allocation::Entity")]
    Allocations,
}

impl Related<super::earmark_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
