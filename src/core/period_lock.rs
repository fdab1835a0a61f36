//! Closed-period guard.
//!
//! A single cutoff date (`periodLock.closedUntil`) closes every day on or
//! before it. No voucher dated inside the closed range may be created, amended
//! or deleted.

use crate::{
    core::settings::{self, PERIOD_LOCK_CLOSED_UNTIL},
    entities::{Voucher, voucher},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Fails with [`Error::PeriodLocked`] iff `date <= closed_until`.
pub fn ensure_open(closed_until: Option<NaiveDate>, date: NaiveDate) -> Result<()> {
    match closed_until {
        Some(closed_until) if date <= closed_until => {
            Err(Error::PeriodLocked { date, closed_until })
        }
        _ => Ok(()),
    }
}

/// Current cutoff, `None` when no period has been closed.
pub async fn closed_until<C>(db: &C) -> Result<Option<NaiveDate>>
where
    C: ConnectionTrait,
{
    settings::get_date(db, PERIOD_LOCK_CLOSED_UNTIL).await
}

/// Reads the cutoff and checks `date` against it.
pub async fn ensure_date_open<C>(db: &C, date: NaiveDate) -> Result<()>
where
    C: ConnectionTrait,
{
    ensure_open(closed_until(db).await?, date)
}

/// Closes every day up to and including `date`.
///
/// Vouchers that become immutable get their `locked_at` stamped. Returns the
/// number of newly stamped vouchers. Moving the cutoff backwards is allowed; use
/// [`reopen`] to remove it.
#[instrument(skip(db))]
pub async fn close_through(db: &DatabaseConnection, date: NaiveDate) -> Result<u64> {
    let txn = db.begin().await?;

    settings::set_date(&txn, PERIOD_LOCK_CLOSED_UNTIL, date).await?;

    let stamped = Voucher::update_many()
        .col_expr(voucher::Column::LockedAt, Expr::value(Utc::now()))
        .filter(voucher::Column::Date.lte(date))
        .filter(voucher::Column::LockedAt.is_null())
        .exec(&txn)
        .await?
        .rows_affected;

    txn.commit().await?;
    info!("Closed period through {date}; {stamped} vouchers locked");
    Ok(stamped)
}

/// Removes the cutoff. Existing `locked_at` stamps stay as history.
#[instrument(skip(db))]
pub async fn reopen(db: &DatabaseConnection) -> Result<()> {
    settings::clear_value(db, PERIOD_LOCK_CLOSED_UNTIL).await?;
    info!("Period lock removed");
    Ok(())
}
