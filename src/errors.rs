//! Unified error type for the voucher ledger.
//!
//! Hard errors abort the enclosing database transaction. Fund-balance problems are
//! not errors; they travel as warning strings next to a successful result.

use crate::entities::FundSphere;
use chrono::NaiveDate;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors raised by the ledger core.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any write (missing amount basis, inactive target, ...)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Date falls outside the enforced validity range of a budget or earmark
    #[error("Date {date} is outside the allowed range of {target}")]
    OutOfRange { target: String, date: NaiveDate },

    /// Date is on or before the closed-period cutoff
    #[error("Period is closed: {date} is on or before {closed_until}")]
    PeriodLocked {
        date: NaiveDate,
        closed_until: NaiveDate,
    },

    #[error("Could not issue a free voucher number for {fiscal_year}/{sphere} after {attempts} attempts")]
    SequenceExhausted {
        fiscal_year: i32,
        sphere: FundSphere,
        attempts: u32,
    },

    #[error("Voucher not found: {id}")]
    VoucherNotFound { id: i64 },

    #[error("Allocation not found: {id}")]
    AllocationNotFound { id: i64 },

    #[error("Voucher {id} was already reversed by voucher {reversal_id}")]
    AlreadyReversed { id: i64, reversal_id: i64 },

    /// File write after a committed voucher transaction failed
    #[error("Attachment for voucher {voucher_id} could not be stored: {message}")]
    Attachment { voucher_id: i64, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
