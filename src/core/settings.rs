//! Key-value configuration store.
//!
//! Values live in the `settings` table as strings and are read at the start of
//! every operation that needs them; nothing is cached.

use crate::{
    entities::{Setting, setting},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{Set, prelude::*};
use tracing::debug;

/// Whether outflows may drive an earmark below zero without a warning.
pub const EARMARK_ALLOW_NEGATIVE: &str = "earmark.allowNegative";

/// Last day of the closed period, `YYYY-MM-DD`.
pub const PERIOD_LOCK_CLOSED_UNTIL: &str = "periodLock.closedUntil";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads the raw string stored under `key`.
pub async fn get_value<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let state = Setting::find()
        .filter(setting::Column::Key.eq(key))
        .one(db)
        .await?;
    debug!("Setting {key} = {:?}", state.as_ref().map(|s| &s.value));
    Ok(state.map(|s| s.value))
}

/// Reads a boolean. Missing keys are `false`; `"true"`, `"1"` and `"yes"` are
/// `true` regardless of case.
pub async fn get_bool<C>(db: &C, key: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(get_value(db, key)
        .await?
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")))
}

/// Reads an ISO date. Missing or empty values are `None`.
pub async fn get_date<C>(db: &C, key: &str) -> Result<Option<NaiveDate>>
where
    C: ConnectionTrait,
{
    match get_value(db, key).await? {
        Some(v) if !v.trim().is_empty() => NaiveDate::parse_from_str(v.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|e| Error::Config {
                message: format!("Failed to parse {key} = {v:?}: {e}"),
            }),
        _ => Ok(None),
    }
}

/// Inserts or overwrites the value stored under `key`.
pub async fn set_value<C>(db: &C, key: &str, value: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();

    let existing = Setting::find()
        .filter(setting::Column::Key.eq(key))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: setting::ActiveModel = state.into();
        active_model.value = Set(value.to_string());
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let new_state = setting::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(now),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }

    Ok(())
}

/// Stores a date in the format [`get_date`] reads.
pub async fn set_date<C>(db: &C, key: &str, date: NaiveDate) -> Result<()>
where
    C: ConnectionTrait,
{
    set_value(db, key, &date.format(DATE_FORMAT).to_string()).await
}

/// Removes `key`; a no-op when it is absent.
pub async fn clear_value<C>(db: &C, key: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    Setting::delete_many()
        .filter(setting::Column::Key.eq(key))
        .exec(db)
        .await?;
    Ok(())
}
