//! Budget allocation entity - junction between a voucher and a budget with a partial amount.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget allocation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_allocations")]
pub struct Model {
    /// Unique identifier of the allocation row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Voucher the amount is taken from
    pub voucher_id: i64,
    /// Budget receiving the amount
    pub budget_id: i64,
    /// Allocated amount, positive
    pub amount: Decimal,
    /// When the row was written
    pub created_at: DateTimeUtc,
}

/// Each allocation links one voucher and one budget
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
    #[sea_orm(
        belongs_to = "super::budget::Entity",
        from = "Column::BudgetId",
        to = "super::budget::Column::Id"
    )]
    Budget,
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl Related<super::budget::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Budget.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
