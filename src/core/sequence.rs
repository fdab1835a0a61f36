//! Voucher numbering.
//!
//! Each `(fiscal_year, sphere)` pair owns one counter row. Issuing a number
//! increments that row inside the caller's transaction, so a rolled-back write
//! also gives its number back.

use crate::{
    entities::{FundSphere, SequenceCounter, sequence_counter},
    errors::{Error, Result},
};
use sea_orm::{DbErr, Set, SqlErr, prelude::*, sea_query::Expr};
use std::future::Future;
use tracing::{debug, warn};

/// Number of fresh sequence numbers tried before giving up.
pub const MAX_ATTEMPTS: u32 = 5;

/// Increments and returns the counter for `(fiscal_year, sphere)`, creating it
/// at zero first if needed.
pub async fn next_sequence<C>(db: &C, fiscal_year: i32, sphere: FundSphere) -> Result<i32>
where
    C: ConnectionTrait,
{
    let counter = SequenceCounter::find()
        .filter(sequence_counter::Column::FiscalYear.eq(fiscal_year))
        .filter(sequence_counter::Column::Sphere.eq(sphere))
        .one(db)
        .await?;

    let Some(counter) = counter else {
        sequence_counter::ActiveModel {
            fiscal_year: Set(fiscal_year),
            sphere: Set(sphere),
            last_seq_no: Set(1),
            ..Default::default()
        }
        .insert(db)
        .await?;
        debug!("Started sequence {fiscal_year}/{sphere}");
        return Ok(1);
    };

    SequenceCounter::update_many()
        .col_expr(
            sequence_counter::Column::LastSeqNo,
            Expr::col(sequence_counter::Column::LastSeqNo).add(1),
        )
        .filter(sequence_counter::Column::Id.eq(counter.id))
        .exec(db)
        .await?;

    Ok(counter.last_seq_no + 1)
}

/// Last issued number for `(fiscal_year, sphere)`, `None` before first use.
pub async fn last_sequence<C>(db: &C, fiscal_year: i32, sphere: FundSphere) -> Result<Option<i32>>
where
    C: ConnectionTrait,
{
    Ok(SequenceCounter::find()
        .filter(sequence_counter::Column::FiscalYear.eq(fiscal_year))
        .filter(sequence_counter::Column::Sphere.eq(sphere))
        .one(db)
        .await?
        .map(|c| c.last_seq_no))
}

/// Renders the human-readable voucher number, e.g. `2025-IB-00042`.
///
/// Pure: the same inputs always give the same string, and distinct
/// `(fiscal_year, sphere, seq_no)` triples give distinct strings.
#[must_use]
pub fn render_voucher_no(fiscal_year: i32, sphere: FundSphere, seq_no: i32) -> String {
    format!("{fiscal_year}-{}-{seq_no:05}", sphere.code())
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Runs `write` with freshly issued numbers until it stops hitting a
/// uniqueness violation, at most [`MAX_ATTEMPTS`] times.
///
/// The store has a single writer, so a collision means the counter table no
/// longer matches the voucher table (e.g. it was edited by hand).
pub(crate) async fn with_fresh_number<C, T, F, Fut>(
    db: &C,
    fiscal_year: i32,
    sphere: FundSphere,
    mut write: F,
) -> Result<T>
where
    C: ConnectionTrait,
    F: FnMut(i32, String) -> Fut,
    Fut: Future<Output = std::result::Result<T, DbErr>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let seq_no = next_sequence(db, fiscal_year, sphere).await?;
        let voucher_no = render_voucher_no(fiscal_year, sphere, seq_no);

        match write(seq_no, voucher_no.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if is_unique_violation(&err) => {
                warn!(attempt, %voucher_no, "Voucher number already taken, issuing the next one");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::SequenceExhausted {
        fiscal_year,
        sphere,
        attempts: MAX_ATTEMPTS,
    })
}
