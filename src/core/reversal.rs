//! Reversal (storno) of posted vouchers.
//!
//! A reversal is a new voucher dated today with the inverse kind and negated
//! amounts. It keeps the original's sphere, counterparty, payment fields, tags
//! and allocation rows, so every earmark and budget the original touched is
//! balanced out again. The two vouchers point at each other through
//! `reversed_by_voucher_id` / `original_voucher_id`.

use crate::{
    core::{
        allocation::{self, AllocationKind},
        amounts::Amounts,
        audit::{self, AuditAction, ENTITY_VOUCHER},
        period_lock, tags,
        voucher::{
            VoucherSnapshot, find_voucher_in, insert_voucher_in, load_snapshot_in, set_reversed_by,
        },
    },
    entities::voucher,
    errors::{Error, Result},
};
use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Result of [`reverse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalOutcome {
    /// Voucher that was reversed
    pub original_id: i64,
    /// Newly created reversal voucher
    pub reversal_id: i64,
    /// Number issued to the reversal
    pub voucher_no: String,
    /// Gross amount of the reversal, the negated original
    pub gross_amount: Decimal,
}

fn mirror_row(
    original: &voucher::Model,
    date: NaiveDate,
    actor_id: Option<&str>,
) -> voucher::ActiveModel {
    let amounts = Amounts {
        net: original.net_amount,
        vat_rate: original.vat_rate,
        vat: original.vat_amount,
        gross: original.gross_amount,
    }
    .negated();
    let description = match &original.description {
        Some(text) => format!("Reversal of {}: {text}", original.voucher_no),
        None => format!("Reversal of {}", original.voucher_no),
    };
    let now = Utc::now();

    voucher::ActiveModel {
        date: Set(date),
        kind: Set(original.kind.inverse()),
        sphere: Set(original.sphere),
        description: Set(Some(description)),
        counterparty: Set(original.counterparty.clone()),
        payment_method: Set(original.payment_method),
        transfer_from: Set(original.transfer_from),
        transfer_to: Set(original.transfer_to),
        net_amount: Set(amounts.net),
        vat_rate: Set(amounts.vat_rate),
        vat_amount: Set(amounts.vat),
        gross_amount: Set(amounts.gross),
        earmark_id: Set(None),
        earmark_amount: Set(None),
        budget_id: Set(None),
        budget_amount: Set(None),
        created_by: Set(actor_id.map(ToString::to_string)),
        created_at: Set(now),
        updated_at: Set(now),
        locked_at: Set(None),
        reversed_by_voucher_id: Set(None),
        original_voucher_id: Set(Some(original.id)),
        ..Default::default()
    }
}

/// Posts the reversal of `original_id` at today's date.
///
/// # Errors
/// - [`Error::VoucherNotFound`] for an unknown id
/// - [`Error::AlreadyReversed`] when the voucher already has a reversal
/// - [`Error::PeriodLocked`] when today is in a closed period
/// - [`Error::SequenceExhausted`] when no free number could be issued
#[instrument(skip(db))]
pub async fn reverse(
    db: &DatabaseConnection,
    original_id: i64,
    actor_id: Option<&str>,
) -> Result<ReversalOutcome> {
    let today = Local::now().date_naive();
    let txn = db.begin().await?;

    let original = find_voucher_in(&txn, original_id).await?;
    if let Some(reversal_id) = original.reversed_by_voucher_id {
        return Err(Error::AlreadyReversed {
            id: original_id,
            reversal_id,
        });
    }
    period_lock::ensure_date_open(&txn, today).await?;

    let before = load_snapshot_in(&txn, original.clone()).await?;
    let mirror = mirror_row(&original, today, actor_id);
    let reversal = insert_voucher_in(&txn, mirror, today, original.sphere).await?;

    for kind in [AllocationKind::Budget, AllocationKind::Earmark] {
        let rows = if kind == AllocationKind::Budget {
            &before.budgets
        } else {
            &before.earmarks
        };
        if rows.is_empty() {
            continue;
        }
        let entries: Vec<_> = rows
            .iter()
            .map(|a| allocation::AllocationEntry::new(a.target_id, a.amount))
            .collect();
        allocation::replace_all_in(&txn, kind, reversal.id, &entries).await?;
    }
    if !before.tags.is_empty() {
        tags::set_tags(&txn, reversal.id, &before.tags).await?;
    }

    set_reversed_by(&txn, original_id, Some(reversal.id)).await?;

    let created = load_snapshot_in(&txn, find_voucher_in(&txn, reversal.id).await?).await?;
    let diff = audit::snapshot_diff::<VoucherSnapshot, _>(None, Some(&created))?;
    audit::record(&txn, actor_id, ENTITY_VOUCHER, reversal.id, AuditAction::Create, diff).await?;

    let after = load_snapshot_in(&txn, find_voucher_in(&txn, original_id).await?).await?;
    let diff = audit::snapshot_diff(Some(&before), Some(&after))?;
    audit::record(&txn, actor_id, ENTITY_VOUCHER, original_id, AuditAction::Reverse, diff).await?;

    txn.commit().await?;
    info!(
        "Reversed voucher {} ({original_id}) with {} ({})",
        original.voucher_no, reversal.voucher_no, reversal.id
    );

    Ok(ReversalOutcome {
        original_id,
        reversal_id: reversal.id,
        voucher_no: reversal.voucher_no,
        gross_amount: reversal.gross_amount,
    })
}
