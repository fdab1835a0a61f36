//! Budget entity - a planned spending envelope for one fiscal year and fund sphere.
//!
//! Vouchers never change a budget row; consumption is derived from allocations.

use super::enums::FundSphere;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    /// Unique identifier for the budget
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Fiscal year the budget plans for
    pub fiscal_year: i32,
    /// Fund sphere the budget belongs to
    pub sphere: FundSphere,
    /// Planned amount, informational only
    pub planned_amount: Decimal,
    /// First valid day
    pub start_date: Option<Date>,
    /// Last valid day
    pub end_date: Option<Date>,
    /// Reject allocations for vouchers dated outside `start_date..=end_date`
    pub enforce_date_range: bool,
    /// Archived budgets accept no new allocations
    pub is_archived: bool,
}

/// Defines relationships between Budget and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::budget_allocation::Entity")]
    Allocations,
}

impl Related<super::budget_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
