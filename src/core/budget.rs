//! Budget metadata.
//!
//! Budgets are planning entities; vouchers reference them through allocation
//! rows but never modify them.

use crate::{
    entities::{Budget, FundSphere, budget},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{Set, prelude::*};
use tracing::info;

/// Fields of a new budget.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBudget {
    /// Display name, must not be blank
    pub name: String,
    /// Fiscal year the budget plans for
    pub fiscal_year: i32,
    /// Fund sphere the budget belongs to
    pub sphere: FundSphere,
    /// Planned amount, not negative
    pub planned_amount: Decimal,
    /// First valid day
    pub start_date: Option<NaiveDate>,
    /// Last valid day
    pub end_date: Option<NaiveDate>,
    /// Reject vouchers dated outside `start_date..=end_date`
    pub enforce_date_range: bool,
}

/// Creates a budget after validating name, amount and date range.
pub async fn create_budget<C>(db: &C, input: NewBudget) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    if input.name.trim().is_empty() {
        return Err(Error::validation("Budget name cannot be empty"));
    }
    if input.planned_amount < Decimal::ZERO {
        return Err(Error::validation("Planned amount cannot be negative"));
    }
    check_range(input.start_date, input.end_date)?;

    let model = budget::ActiveModel {
        name: Set(input.name.trim().to_string()),
        fiscal_year: Set(input.fiscal_year),
        sphere: Set(input.sphere),
        planned_amount: Set(input.planned_amount),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        enforce_date_range: Set(input.enforce_date_range),
        is_archived: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created budget {} ({})", model.id, model.name);
    Ok(model)
}

/// Looks up a budget by id.
pub async fn get_budget<C>(db: &C, budget_id: i64) -> Result<Option<budget::Model>>
where
    C: ConnectionTrait,
{
    Budget::find_by_id(budget_id).one(db).await.map_err(Into::into)
}

/// Archived budgets reject new allocations; existing rows stay valid.
pub async fn set_budget_archived<C>(db: &C, budget_id: i64, archived: bool) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    let existing = get_budget(db, budget_id)
        .await?
        .ok_or_else(|| Error::validation(format!("Budget {budget_id} not found")))?;
    let mut active: budget::ActiveModel = existing.into();
    active.is_archived = Set(archived);
    Ok(active.update(db).await?)
}

pub(crate) fn check_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(Error::validation(format!(
            "Range start {s} is after range end {e}"
        ))),
        _ => Ok(()),
    }
}

/// `true` when `date` lies within the optional inclusive bounds.
pub(crate) fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_in_range_bounds_are_inclusive() {
        let (s, e) = (Some(ymd(2025, 1, 1)), Some(ymd(2025, 6, 30)));
        assert!(in_range(ymd(2025, 1, 1), s, e));
        assert!(in_range(ymd(2025, 6, 30), s, e));
        assert!(!in_range(ymd(2025, 7, 1), s, e));
        assert!(in_range(ymd(1900, 1, 1), None, e));
    }

    #[tokio::test]
    async fn test_create_budget_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let mut input = test_budget_input("");
        assert!(matches!(
            create_budget(&db, input.clone()).await,
            Err(Error::Validation { .. })
        ));

        input.name = "Youth work".to_string();
        input.start_date = Some(ymd(2025, 12, 1));
        input.end_date = Some(ymd(2025, 1, 1));
        assert!(matches!(
            create_budget(&db, input).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_budget() -> Result<()> {
        let db = setup_test_db().await?;
        let b = create_test_budget(&db, "Youth work").await?;
        assert!(!b.is_archived);

        let archived = set_budget_archived(&db, b.id, true).await?;
        assert!(archived.is_archived);
        assert!(get_budget(&db, b.id).await?.unwrap().is_archived);
        Ok(())
    }
}
