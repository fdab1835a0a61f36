//! Shared test utilities for the voucher ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating vouchers, budgets and earmarks with sensible defaults.

use crate::{
    core::{
        attachments::AttachmentStore,
        budget::{self, NewBudget},
        earmark::{self, NewEarmark},
        voucher::{self, NewVoucher},
    },
    entities::{self, FundSphere, SequenceCounter, VoucherKind, sequence_counter},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, prelude::*, sea_query::Expr};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shorthand for a calendar date; panics on an invalid date.
#[allow(clippy::unwrap_used)]
pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Whole-unit decimal amount.
pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Attachment store under the system temp dir, one directory per test.
pub fn test_attachment_store(name: &str) -> AttachmentStore {
    AttachmentStore::new(
        std::env::temp_dir().join(format!("voucher-ledger-{}-{name}", std::process::id())),
    )
}

/// Creates an OUT voucher in the ideal sphere with the given gross amount.
pub async fn create_test_voucher(
    db: &DatabaseConnection,
    date: NaiveDate,
    gross: Decimal,
) -> Result<entities::voucher::Model> {
    create_test_voucher_of_kind(db, VoucherKind::Out, date, gross).await
}

/// Creates an ideal-sphere voucher of `kind`.
pub async fn create_test_voucher_of_kind(
    db: &DatabaseConnection,
    kind: VoucherKind,
    date: NaiveDate,
    gross: Decimal,
) -> Result<entities::voucher::Model> {
    let input = NewVoucher::new(date, kind, FundSphere::Ideal)
        .gross(gross)
        .with_description("Test voucher");
    store_test_voucher(db, input).await
}

/// Creates a 10.00 OUT voucher in `sphere`.
pub async fn create_test_voucher_in_sphere(
    db: &DatabaseConnection,
    sphere: FundSphere,
    date: NaiveDate,
) -> Result<entities::voucher::Model> {
    let input = NewVoucher::new(date, VoucherKind::Out, sphere).gross(dec(10));
    store_test_voucher(db, input).await
}

async fn store_test_voucher(
    db: &DatabaseConnection,
    input: NewVoucher,
) -> Result<entities::voucher::Model> {
    let store = test_attachment_store("fixtures");
    let created = voucher::create_voucher(db, &store, input, Some("test_user")).await?;
    voucher::get_voucher(db, created.id)
        .await?
        .ok_or(Error::VoucherNotFound { id: created.id })
}

/// Budget input with sensible defaults.
///
/// # Defaults
/// * `fiscal_year`: 2025
/// * `sphere`: ideal
/// * `planned_amount`: 1000
/// * no date range
pub fn test_budget_input(name: &str) -> NewBudget {
    NewBudget {
        name: name.to_string(),
        fiscal_year: 2025,
        sphere: FundSphere::Ideal,
        planned_amount: dec(1000),
        start_date: None,
        end_date: None,
        enforce_date_range: false,
    }
}

/// Creates a budget from [`test_budget_input`].
pub async fn create_test_budget(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::budget::Model> {
    budget::create_budget(db, test_budget_input(name)).await
}

/// Creates an active earmark without a date range.
pub async fn create_test_earmark(
    db: &DatabaseConnection,
    code: &str,
    capital_cap: Option<Decimal>,
) -> Result<entities::earmark::Model> {
    earmark::create_earmark(
        db,
        NewEarmark {
            code: code.to_string(),
            name: format!("Earmark {code}"),
            capital_cap,
            start_date: None,
            end_date: None,
            enforce_date_range: false,
        },
    )
    .await
}

/// Creates an earmark that only accepts vouchers dated within `start..=end`.
pub async fn create_ranged_earmark(
    db: &DatabaseConnection,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<entities::earmark::Model> {
    earmark::create_earmark(
        db,
        NewEarmark {
            code: code.to_string(),
            name: format!("Earmark {code}"),
            capital_cap: None,
            start_date: Some(start),
            end_date: Some(end),
            enforce_date_range: true,
        },
    )
    .await
}

/// Overwrites a sequence counter, simulating a hand-edited database.
pub async fn set_counter(
    db: &DatabaseConnection,
    fiscal_year: i32,
    sphere: FundSphere,
    last_seq_no: i32,
) -> Result<()> {
    SequenceCounter::update_many()
        .col_expr(sequence_counter::Column::LastSeqNo, Expr::value(last_seq_no))
        .filter(sequence_counter::Column::FiscalYear.eq(fiscal_year))
        .filter(sequence_counter::Column::Sphere.eq(sphere))
        .exec(db)
        .await?;
    Ok(())
}
