//! Earmark metadata.

use crate::{
    core::budget::check_range,
    entities::{Earmark, earmark},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{Set, prelude::*};
use tracing::info;

/// Fields of a new earmark.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEarmark {
    /// Short unique code, e.g. `ROOF`
    pub code: String,
    /// Display name
    pub name: String,
    /// Capital the earmark starts with; `None` counts as zero
    pub capital_cap: Option<Decimal>,
    /// First valid day
    pub start_date: Option<NaiveDate>,
    /// Last valid day
    pub end_date: Option<NaiveDate>,
    /// Reject vouchers dated outside `start_date..=end_date`
    pub enforce_date_range: bool,
}

/// Creates an active earmark. The code must be unique.
pub async fn create_earmark<C>(db: &C, input: NewEarmark) -> Result<earmark::Model>
where
    C: ConnectionTrait,
{
    let code = input.code.trim();
    if code.is_empty() {
        return Err(Error::validation("Earmark code cannot be empty"));
    }
    if input.capital_cap.is_some_and(|c| c < Decimal::ZERO) {
        return Err(Error::validation("Capital cap cannot be negative"));
    }
    check_range(input.start_date, input.end_date)?;

    if get_earmark_by_code(db, code).await?.is_some() {
        return Err(Error::validation(format!("Earmark code {code} is already in use")));
    }

    let model = earmark::ActiveModel {
        code: Set(code.to_string()),
        name: Set(input.name.trim().to_string()),
        is_active: Set(true),
        capital_cap: Set(input.capital_cap),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        enforce_date_range: Set(input.enforce_date_range),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created earmark {} ({})", model.id, model.code);
    Ok(model)
}

/// Looks up an earmark by id.
pub async fn get_earmark<C>(db: &C, earmark_id: i64) -> Result<Option<earmark::Model>>
where
    C: ConnectionTrait,
{
    Earmark::find_by_id(earmark_id).one(db).await.map_err(Into::into)
}

/// Looks up an earmark by its code.
pub async fn get_earmark_by_code<C>(db: &C, code: &str) -> Result<Option<earmark::Model>>
where
    C: ConnectionTrait,
{
    Earmark::find()
        .filter(earmark::Column::Code.eq(code))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Inactive earmarks reject new allocations; existing rows stay valid.
pub async fn set_earmark_active<C>(db: &C, earmark_id: i64, active: bool) -> Result<earmark::Model>
where
    C: ConnectionTrait,
{
    let existing = get_earmark(db, earmark_id)
        .await?
        .ok_or_else(|| Error::validation(format!("Earmark {earmark_id} not found")))?;
    let mut model: earmark::ActiveModel = existing.into();
    model.is_active = Set(active);
    Ok(model.update(db).await?)
}
