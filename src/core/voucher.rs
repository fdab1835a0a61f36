//! Voucher store - create, amend and delete vouchers.
//!
//! Every operation runs in one database transaction: the period-lock check,
//! earmark and budget validation, numbering, allocation rows, tags and the
//! audit row either all commit or none do. Attachments are written after the
//! commit, see [`crate::core::attachments`].
//!
//! Earmark balances are advisory. When `earmark.allowNegative` is off and an
//! outflow would leave an earmark below zero, the voucher is still written and
//! the result carries a warning for a human to look at.

use crate::{
    core::{
        allocation::{self, Allocation, AllocationEntry, AllocationKind},
        amounts::{AmountBasis, Amounts, compute_amounts},
        attachments::{AttachmentInput, AttachmentStore},
        audit::{self, AuditAction, ENTITY_VOUCHER},
        period_lock,
        sequence::with_fresh_number,
        settings::{self, EARMARK_ALLOW_NEGATIVE},
        tags,
    },
    entities::{FundSphere, PaymentMethod, Voucher, VoucherKind, voucher},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Unchanged, DatabaseTransaction, QueryOrder, Set, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Input of [`create_voucher`].
///
/// Exactly one of `net_amount` and `gross_amount` must be set. Allocations may
/// be given as lists or through the single `earmark_id` / `budget_id` fields; a
/// non-empty list wins over the single field. A single field without an amount
/// allocates the full gross amount.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVoucher {
    /// Voucher date; decides fiscal year and period lock
    pub date: NaiveDate,
    /// IN, OUT or TRANSFER
    pub kind: VoucherKind,
    /// Fund sphere, part of the number
    pub sphere: FundSphere,
    /// Free text
    pub description: Option<String>,
    /// Payer or payee
    pub counterparty: Option<String>,
    /// Cash or bank
    pub payment_method: Option<PaymentMethod>,
    /// Source account, TRANSFER only
    pub transfer_from: Option<PaymentMethod>,
    /// Target account, TRANSFER only
    pub transfer_to: Option<PaymentMethod>,
    /// Net amount; VAT and gross are derived
    pub net_amount: Option<Decimal>,
    /// Gross amount; net and VAT stay zero
    pub gross_amount: Option<Decimal>,
    /// Percent
    pub vat_rate: Decimal,
    /// Single earmark, used when `earmarks` is empty
    pub earmark_id: Option<i64>,
    /// Amount for `earmark_id`, defaults to the gross amount
    pub earmark_amount: Option<Decimal>,
    /// Single budget, used when `budgets` is empty
    pub budget_id: Option<i64>,
    /// Amount for `budget_id`, defaults to the gross amount
    pub budget_amount: Option<Decimal>,
    /// Earmark allocations
    pub earmarks: Vec<AllocationEntry>,
    /// Budget allocations
    pub budgets: Vec<AllocationEntry>,
    /// Tag names
    pub tags: Vec<String>,
    /// Files stored after the voucher commits
    pub attachments: Vec<AttachmentInput>,
}

impl NewVoucher {
    /// A voucher without amounts; set one with [`Self::net`] or [`Self::gross`].
    #[must_use]
    pub const fn new(date: NaiveDate, kind: VoucherKind, sphere: FundSphere) -> Self {
        Self {
            date,
            kind,
            sphere,
            description: None,
            counterparty: None,
            payment_method: None,
            transfer_from: None,
            transfer_to: None,
            net_amount: None,
            gross_amount: None,
            vat_rate: Decimal::ZERO,
            earmark_id: None,
            earmark_amount: None,
            budget_id: None,
            budget_amount: None,
            earmarks: Vec::new(),
            budgets: Vec::new(),
            tags: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Sets a net amount and VAT rate (percent).
    #[must_use]
    pub fn net(mut self, amount: Decimal, vat_rate: Decimal) -> Self {
        self.net_amount = Some(amount);
        self.vat_rate = vat_rate;
        self
    }

    /// Sets a gross amount.
    #[must_use]
    pub fn gross(mut self, amount: Decimal) -> Self {
        self.gross_amount = Some(amount);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Changes applied by [`update_voucher`]. `None` leaves a field as it is; for
/// nullable columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoucherPatch {
    /// New date
    pub date: Option<NaiveDate>,
    /// New kind
    pub kind: Option<VoucherKind>,
    /// New fund sphere; renumbers the voucher
    pub sphere: Option<FundSphere>,
    /// New or cleared description
    pub description: Option<Option<String>>,
    /// New or cleared counterparty
    pub counterparty: Option<Option<String>>,
    /// New or cleared payment method
    pub payment_method: Option<Option<PaymentMethod>>,
    /// New or cleared transfer source
    pub transfer_from: Option<Option<PaymentMethod>>,
    /// New or cleared transfer target
    pub transfer_to: Option<Option<PaymentMethod>>,
    /// New net amount; switches to the net basis
    pub net_amount: Option<Decimal>,
    /// New gross amount; switches to the gross basis
    pub gross_amount: Option<Decimal>,
    /// New VAT rate in percent
    pub vat_rate: Option<Decimal>,
    /// Replaces all earmark allocations; `Some(vec![])` removes them
    pub earmarks: Option<Vec<AllocationEntry>>,
    /// Replaces all budget allocations; `Some(vec![])` removes them
    pub budgets: Option<Vec<AllocationEntry>>,
    /// Replaces all tags
    pub tags: Option<Vec<String>>,
    /// Files to add after the update commits
    pub attachments: Vec<AttachmentInput>,
}

impl VoucherPatch {
    const fn touches_amounts(&self) -> bool {
        self.net_amount.is_some() || self.gross_amount.is_some() || self.vat_rate.is_some()
    }
}

/// Result of [`create_voucher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVoucher {
    /// Voucher id
    pub id: i64,
    /// Issued number
    pub voucher_no: String,
    /// Stored gross amount
    pub gross_amount: Decimal,
    /// Non-fatal findings, e.g. an earmark driven below zero
    pub warnings: Vec<String>,
}

/// Result of [`update_voucher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedVoucher {
    /// Voucher id
    pub id: i64,
    /// Current number, new if the voucher was renumbered
    pub voucher_no: String,
    /// Non-fatal findings, including a renumbering notice
    pub warnings: Vec<String>,
}

/// Voucher together with everything the audit trail snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoucherSnapshot {
    /// Voucher row
    pub voucher: voucher::Model,
    /// Tag names, sorted
    pub tags: Vec<String>,
    /// Budget allocations, oldest first
    pub budgets: Vec<Allocation>,
    /// Earmark allocations, oldest first
    pub earmarks: Vec<Allocation>,
}

// ---------------------------------------------------------------------------
// Shared building blocks
// ---------------------------------------------------------------------------

pub(crate) async fn load_snapshot_in<C>(db: &C, voucher: voucher::Model) -> Result<VoucherSnapshot>
where
    C: ConnectionTrait,
{
    let id = voucher.id;
    Ok(VoucherSnapshot {
        voucher,
        tags: tags::get_tags(db, id).await?,
        budgets: allocation::list_in(db, AllocationKind::Budget, id).await?,
        earmarks: allocation::list_in(db, AllocationKind::Earmark, id).await?,
    })
}

pub(crate) async fn find_voucher_in<C>(db: &C, id: i64) -> Result<voucher::Model>
where
    C: ConnectionTrait,
{
    Voucher::find_by_id(id)
        .one(db)
        .await?
        .ok_or(Error::VoucherNotFound { id })
}

/// Inserts a voucher row with a freshly issued number for the row's date and
/// sphere. Shared by creation and reversal.
pub(crate) async fn insert_voucher_in(
    txn: &DatabaseTransaction,
    row: voucher::ActiveModel,
    date: NaiveDate,
    sphere: FundSphere,
) -> Result<voucher::Model> {
    let fiscal_year = date.year();
    with_fresh_number(txn, fiscal_year, sphere, |seq_no, voucher_no| {
        let mut attempt = row.clone();
        attempt.fiscal_year = Set(fiscal_year);
        attempt.seq_no = Set(seq_no);
        attempt.voucher_no = Set(voucher_no);
        async move { attempt.insert(txn).await }
    })
    .await
}

/// TRANSFER vouchers move money between two different accounts; other kinds
/// have no transfer accounts.
fn check_transfer(
    kind: VoucherKind,
    from: Option<PaymentMethod>,
    to: Option<PaymentMethod>,
) -> Result<()> {
    match (kind, from, to) {
        (VoucherKind::Transfer, Some(f), Some(t)) if f != t => Ok(()),
        (VoucherKind::Transfer, Some(_), Some(_)) => Err(Error::validation(
            "Transfer source and target must differ",
        )),
        (VoucherKind::Transfer, _, _) => Err(Error::validation(
            "Transfers need both a source and a target account",
        )),
        (_, None, None) => Ok(()),
        (_, _, _) => Err(Error::validation(
            "Only transfers may carry transfer accounts",
        )),
    }
}

fn entries_from_input(
    list: &[AllocationEntry],
    single_id: Option<i64>,
    single_amount: Option<Decimal>,
    gross: Decimal,
) -> Vec<AllocationEntry> {
    if !list.is_empty() {
        return list.to_vec();
    }
    single_id
        .map(|id| vec![AllocationEntry::new(id, single_amount.unwrap_or_else(|| gross.abs()))])
        .unwrap_or_default()
}

fn entries_from_rows(rows: &[Allocation]) -> Vec<AllocationEntry> {
    rows.iter()
        .map(|a| AllocationEntry::new(a.target_id, a.amount))
        .collect()
}

/// Checks every target at `date` for one allocation kind.
async fn validate_entries<C>(
    db: &C,
    kind: AllocationKind,
    entries: &[AllocationEntry],
    date: NaiveDate,
) -> Result<()>
where
    C: ConnectionTrait,
{
    allocation::check_entries(kind, entries)?;
    for entry in entries {
        allocation::validate_target(db, kind, entry.target_id, date).await?;
    }
    Ok(())
}

/// Warnings for earmarks an outflow would push below zero as of `date`.
///
/// `exclude_voucher` keeps an amended voucher's old rows out of the balance.
async fn earmark_warnings<C>(
    db: &C,
    kind: VoucherKind,
    entries: &[AllocationEntry],
    date: NaiveDate,
    exclude_voucher: Option<i64>,
) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    if kind != VoucherKind::Out
        || entries.is_empty()
        || settings::get_bool(db, EARMARK_ALLOW_NEGATIVE).await?
    {
        return Ok(Vec::new());
    }

    let mut warnings = Vec::new();
    for entry in entries {
        let usage =
            allocation::earmark_usage_in(db, entry.target_id, Some(date), exclude_voucher).await?;
        let remaining = usage.remaining - entry.amount;
        if remaining < Decimal::ZERO {
            warn!(earmark_id = entry.target_id, %remaining, "Earmark would become negative");
            warnings.push(format!(
                "Earmark {} would have a negative remaining balance of {remaining} on {date}",
                entry.target_id
            ));
        }
    }
    Ok(warnings)
}

async fn apply_allocations<C>(
    db: &C,
    voucher_id: i64,
    earmarks: Option<&[AllocationEntry]>,
    budgets: Option<&[AllocationEntry]>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    if let Some(entries) = earmarks {
        allocation::replace_all_in(db, AllocationKind::Earmark, voucher_id, entries).await?;
    }
    if let Some(entries) = budgets {
        allocation::replace_all_in(db, AllocationKind::Budget, voucher_id, entries).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

/// Creates a voucher and returns its number, gross amount and any warnings.
///
/// # Errors
/// - [`Error::Validation`] for a missing or doubled amount basis, bad transfer
///   accounts, or a missing / inactive earmark or budget
/// - [`Error::OutOfRange`] when an earmark or budget enforces a date range that
///   excludes `input.date`
/// - [`Error::PeriodLocked`] when `input.date` is in a closed period
/// - [`Error::SequenceExhausted`] when no free number could be issued
/// - [`Error::Attachment`] when a file write failed after the commit; the
///   voucher exists in that case
#[instrument(
    skip(db, files, input),
    fields(date = %input.date, kind = ?input.kind, sphere = %input.sphere)
)]
pub async fn create_voucher(
    db: &DatabaseConnection,
    files: &AttachmentStore,
    input: NewVoucher,
    actor_id: Option<&str>,
) -> Result<CreatedVoucher> {
    let basis = AmountBasis::from_options(input.net_amount, input.gross_amount)?;
    check_transfer(input.kind, input.transfer_from, input.transfer_to)?;
    let amounts = compute_amounts(basis, input.vat_rate);

    let earmarks =
        entries_from_input(&input.earmarks, input.earmark_id, input.earmark_amount, amounts.gross);
    let budgets =
        entries_from_input(&input.budgets, input.budget_id, input.budget_amount, amounts.gross);

    let txn = db.begin().await?;

    period_lock::ensure_date_open(&txn, input.date).await?;
    validate_entries(&txn, AllocationKind::Earmark, &earmarks, input.date).await?;
    validate_entries(&txn, AllocationKind::Budget, &budgets, input.date).await?;
    let warnings = earmark_warnings(&txn, input.kind, &earmarks, input.date, None).await?;

    let now = Utc::now();
    let row = voucher::ActiveModel {
        date: Set(input.date),
        kind: Set(input.kind),
        sphere: Set(input.sphere),
        description: Set(input.description),
        counterparty: Set(input.counterparty),
        payment_method: Set(input.payment_method),
        transfer_from: Set(input.transfer_from),
        transfer_to: Set(input.transfer_to),
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
        original_voucher_id: Set(None),
        ..Default::default()
    };
    let created = insert_voucher_in(&txn, row, input.date, input.sphere).await?;

    apply_allocations(
        &txn,
        created.id,
        (!earmarks.is_empty()).then_some(earmarks.as_slice()),
        (!budgets.is_empty()).then_some(budgets.as_slice()),
    )
    .await?;
    if !input.tags.is_empty() {
        tags::set_tags(&txn, created.id, &input.tags).await?;
    }

    let after = load_snapshot_in(&txn, find_voucher_in(&txn, created.id).await?).await?;
    let diff = audit::snapshot_diff::<VoucherSnapshot, _>(None, Some(&after))?;
    audit::record(&txn, actor_id, ENTITY_VOUCHER, created.id, AuditAction::Create, diff).await?;

    txn.commit().await?;
    info!("Created voucher {} ({}) gross {}", created.voucher_no, created.id, created.gross_amount);

    files.attach_all(db, created.id, &input.attachments).await?;

    Ok(CreatedVoucher {
        id: created.id,
        voucher_no: created.voucher_no,
        gross_amount: created.gross_amount,
        warnings,
    })
}

/// Amends a voucher in place.
///
/// Both the current and, if it changes, the new date must be open. Moving the
/// voucher to another fiscal year or fund sphere issues a new number and adds
/// a warning naming the old and new number. Earmark and budget targets are
/// re-validated when the allocations or the date change. Amount fields of a
/// voucher that is part of a reversal pair cannot be changed.
///
/// The earmark balance check runs on every update of an OUT voucher, so a
/// patch that changes nothing still returns the warning for an earmark that
/// is already below zero.
#[instrument(skip(db, files, patch))]
pub async fn update_voucher(
    db: &DatabaseConnection,
    files: &AttachmentStore,
    id: i64,
    patch: VoucherPatch,
    actor_id: Option<&str>,
) -> Result<UpdatedVoucher> {
    if patch.net_amount.is_some() && patch.gross_amount.is_some() {
        return Err(Error::validation("Give either a net or a gross amount, not both"));
    }

    let txn = db.begin().await?;
    let current = find_voucher_in(&txn, id).await?;

    let closed_until = period_lock::closed_until(&txn).await?;
    period_lock::ensure_open(closed_until, current.date)?;
    let date = patch.date.unwrap_or(current.date);
    if date != current.date {
        period_lock::ensure_open(closed_until, date)?;
    }

    let kind = patch.kind.unwrap_or(current.kind);
    let sphere = patch.sphere.unwrap_or(current.sphere);
    let transfer_from = patch.transfer_from.unwrap_or(current.transfer_from);
    let transfer_to = patch.transfer_to.unwrap_or(current.transfer_to);
    check_transfer(kind, transfer_from, transfer_to)?;

    let in_reversal_pair =
        current.reversed_by_voucher_id.is_some() || current.original_voucher_id.is_some();
    if in_reversal_pair && patch.touches_amounts() {
        return Err(Error::validation(format!(
            "Amounts of voucher {} are fixed by its reversal pair",
            current.voucher_no
        )));
    }
    let amounts = amended_amounts(&current, &patch);

    let before = load_snapshot_in(&txn, current.clone()).await?;
    let date_changed = date != current.date;
    let earmarks = patch
        .earmarks
        .clone()
        .unwrap_or_else(|| entries_from_rows(&before.earmarks));
    let budgets = patch
        .budgets
        .clone()
        .unwrap_or_else(|| entries_from_rows(&before.budgets));
    if patch.earmarks.is_some() || date_changed {
        validate_entries(&txn, AllocationKind::Earmark, &earmarks, date).await?;
    }
    if patch.budgets.is_some() || date_changed {
        validate_entries(&txn, AllocationKind::Budget, &budgets, date).await?;
    }
    let mut warnings = earmark_warnings(&txn, kind, &earmarks, date, Some(id)).await?;

    let mut row = voucher::ActiveModel {
        id: Unchanged(id),
        date: Set(date),
        kind: Set(kind),
        sphere: Set(sphere),
        transfer_from: Set(transfer_from),
        transfer_to: Set(transfer_to),
        net_amount: Set(amounts.net),
        vat_rate: Set(amounts.vat_rate),
        vat_amount: Set(amounts.vat),
        gross_amount: Set(amounts.gross),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if let Some(description) = patch.description {
        row.description = Set(description);
    }
    if let Some(counterparty) = patch.counterparty {
        row.counterparty = Set(counterparty);
    }
    if let Some(payment_method) = patch.payment_method {
        row.payment_method = Set(payment_method);
    }

    let renumber = sphere != current.sphere || date.year() != current.fiscal_year;
    let updated = if renumber {
        let txn_ref = &txn;
        let updated = with_fresh_number(txn_ref, date.year(), sphere, |seq_no, voucher_no| {
            let mut attempt = row.clone();
            attempt.fiscal_year = Set(date.year());
            attempt.seq_no = Set(seq_no);
            attempt.voucher_no = Set(voucher_no);
            async move { attempt.update(txn_ref).await }
        })
        .await?;
        warn!("Voucher {} renumbered to {}", current.voucher_no, updated.voucher_no);
        warnings.push(format!(
            "Voucher number changed from {} to {}",
            current.voucher_no, updated.voucher_no
        ));
        updated
    } else {
        row.update(&txn).await?
    };

    apply_allocations(&txn, id, patch.earmarks.as_deref(), patch.budgets.as_deref()).await?;
    if let Some(names) = &patch.tags {
        tags::set_tags(&txn, id, names).await?;
    }

    let after = load_snapshot_in(&txn, find_voucher_in(&txn, id).await?).await?;
    let diff = audit::snapshot_diff(Some(&before), Some(&after))?;
    audit::record(&txn, actor_id, ENTITY_VOUCHER, id, AuditAction::Update, diff).await?;

    txn.commit().await?;
    info!("Updated voucher {} ({id})", updated.voucher_no);

    files.attach_all(db, id, &patch.attachments).await?;

    Ok(UpdatedVoucher {
        id,
        voucher_no: updated.voucher_no,
        warnings,
    })
}

/// New amount columns after applying `patch` with the creation rules.
///
/// A new net or gross amount switches to that basis. A new VAT rate alone
/// recomputes from the stored net amount, unless the voucher was entered
/// gross (net is zero), where only the rate is stored.
fn amended_amounts(current: &voucher::Model, patch: &VoucherPatch) -> Amounts {
    let vat_rate = patch.vat_rate.unwrap_or(current.vat_rate);
    match (patch.net_amount, patch.gross_amount) {
        (Some(net), _) => compute_amounts(AmountBasis::Net(net), vat_rate),
        (None, Some(gross)) => compute_amounts(AmountBasis::Gross(gross), vat_rate),
        (None, None) if patch.vat_rate.is_some() && !current.net_amount.is_zero() => {
            compute_amounts(AmountBasis::Net(current.net_amount), vat_rate)
        }
        (None, None) => Amounts {
            net: current.net_amount,
            vat_rate,
            vat: current.vat_amount,
            gross: current.gross_amount,
        },
    }
}

/// Deletes a voucher with its allocation rows, tag assignments and attachment
/// records. Files on disk are left in place.
///
/// If the voucher belongs to a reversal pair, the partner's link is cleared in
/// the same transaction so neither side points at a missing row.
#[instrument(skip(db))]
pub async fn delete_voucher(
    db: &DatabaseConnection,
    id: i64,
    actor_id: Option<&str>,
) -> Result<()> {
    use crate::entities::{VoucherFile, VoucherTag, voucher_file, voucher_tag};

    let txn = db.begin().await?;
    let current = find_voucher_in(&txn, id).await?;
    period_lock::ensure_date_open(&txn, current.date).await?;

    let before = load_snapshot_in(&txn, current.clone()).await?;
    let diff = audit::snapshot_diff::<_, VoucherSnapshot>(Some(&before), None)?;
    audit::record(&txn, actor_id, ENTITY_VOUCHER, id, AuditAction::Delete, diff).await?;

    for partner_id in [current.reversed_by_voucher_id, current.original_voucher_id]
        .into_iter()
        .flatten()
    {
        unlink_partner(&txn, partner_id, id, actor_id).await?;
    }

    allocation::delete_all_for_voucher_in(&txn, id).await?;
    VoucherTag::delete_many()
        .filter(voucher_tag::Column::VoucherId.eq(id))
        .exec(&txn)
        .await?;
    VoucherFile::delete_many()
        .filter(voucher_file::Column::VoucherId.eq(id))
        .exec(&txn)
        .await?;
    Voucher::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    info!("Deleted voucher {} ({id})", current.voucher_no);
    Ok(())
}

async fn unlink_partner<C>(
    db: &C,
    partner_id: i64,
    deleted_id: i64,
    actor_id: Option<&str>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(partner) = Voucher::find_by_id(partner_id).one(db).await? else {
        return Ok(());
    };

    let before = partner.clone();
    let mut active: voucher::ActiveModel = partner.into();
    if before.reversed_by_voucher_id == Some(deleted_id) {
        active.reversed_by_voucher_id = Set(None);
    }
    if before.original_voucher_id == Some(deleted_id) {
        active.original_voucher_id = Set(None);
    }
    active.updated_at = Set(Utc::now());
    let after = active.update(db).await?;

    let diff = audit::snapshot_diff(Some(&before), Some(&after))?;
    audit::record(db, actor_id, ENTITY_VOUCHER, partner_id, AuditAction::Update, diff).await?;
    Ok(())
}

/// Looks up a voucher by id.
pub async fn get_voucher(db: &DatabaseConnection, id: i64) -> Result<Option<voucher::Model>> {
    Voucher::find_by_id(id).one(db).await.map_err(Into::into)
}

/// Voucher with its tags and allocations.
pub async fn get_snapshot(db: &DatabaseConnection, id: i64) -> Result<VoucherSnapshot> {
    let voucher = find_voucher_in(db, id).await?;
    load_snapshot_in(db, voucher).await
}

/// Vouchers of a fiscal year in number order, optionally for one sphere.
pub async fn list_vouchers(
    db: &DatabaseConnection,
    fiscal_year: i32,
    sphere: Option<FundSphere>,
) -> Result<Vec<voucher::Model>> {
    let mut query = Voucher::find().filter(voucher::Column::FiscalYear.eq(fiscal_year));
    if let Some(sphere) = sphere {
        query = query.filter(voucher::Column::Sphere.eq(sphere));
    }
    query
        .order_by_asc(voucher::Column::Sphere)
        .order_by_asc(voucher::Column::SeqNo)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Points a voucher at the voucher that reverses it, or clears the link.
pub(crate) async fn set_reversed_by<C>(db: &C, id: i64, reversal_id: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    Voucher::update_many()
        .col_expr(voucher::Column::ReversedByVoucherId, Expr::value(reversal_id))
        .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(voucher::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{earmark, period_lock, sequence};
    use crate::entities::{AuditLog, SequenceCounter, sequence_counter};
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_requires_exactly_one_basis() -> Result<()> {
        // Fails before touching the database
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let files = test_attachment_store("basis");

        let none = NewVoucher::new(ymd(2025, 1, 10), VoucherKind::In, FundSphere::Ideal);
        let result = create_voucher(&db, &files, none.clone(), None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let both = none.net(dec(10), dec(19)).gross(dec(11));
        let result = create_voucher(&db, &files, both, None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_computes_amounts_and_numbers() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("amounts");

        let input = NewVoucher::new(ymd(2025, 1, 10), VoucherKind::Out, FundSphere::Ideal)
            .net(dec(100), dec(19))
            .with_description("Printer paper");
        let created = create_voucher(&db, &files, input, Some("alice")).await?;

        assert_eq!(created.voucher_no, "2025-IB-00001");
        assert_eq!(created.gross_amount, dec(119));
        assert!(created.warnings.is_empty());

        let row = get_voucher(&db, created.id).await?.unwrap();
        assert_eq!(row.net_amount, dec(100));
        assert_eq!(row.vat_amount, dec(19));
        assert_eq!(row.seq_no, 1);
        assert_eq!(row.fiscal_year, 2025);
        assert_eq!(row.created_by.as_deref(), Some("alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_gross_basis_keeps_net_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("gross");

        let input =
            NewVoucher::new(ymd(2025, 1, 10), VoucherKind::In, FundSphere::Ideal).gross(dec(50));
        let created = create_voucher(&db, &files, input, None).await?;
        let row = get_voucher(&db, created.id).await?.unwrap();
        assert_eq!(row.gross_amount, dec(50));
        assert_eq!(row.net_amount, Decimal::ZERO);
        assert_eq!(row.vat_amount, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_is_gapless_per_year_and_sphere() -> Result<()> {
        let db = setup_test_db().await?;

        for day in 1..=4 {
            create_test_voucher(&db, ymd(2025, 2, day), dec(10)).await?;
        }
        create_test_voucher_in_sphere(&db, FundSphere::Commercial, ymd(2025, 2, 5)).await?;
        create_test_voucher(&db, ymd(2026, 1, 1), dec(10)).await?;

        let ideal = list_vouchers(&db, 2025, Some(FundSphere::Ideal)).await?;
        let seqs: Vec<i32> = ideal.iter().map(|v| v.seq_no).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let commercial = list_vouchers(&db, 2025, Some(FundSphere::Commercial)).await?;
        assert_eq!(commercial[0].voucher_no, "2025-WB-00001");

        let next_year = list_vouchers(&db, 2026, None).await?;
        assert_eq!(next_year[0].voucher_no, "2026-IB-00001");
        Ok(())
    }

    #[tokio::test]
    async fn test_period_lock_boundary() -> Result<()> {
        let db = setup_test_db().await?;
        period_lock::close_through(&db, ymd(2024, 12, 31)).await?;

        let locked = create_test_voucher(&db, ymd(2024, 12, 31), dec(10)).await;
        assert!(matches!(locked, Err(Error::PeriodLocked { .. })));

        let open = create_test_voucher(&db, ymd(2025, 1, 1), dec(10)).await;
        assert!(open.is_ok());

        // The failed attempt left nothing behind
        assert_eq!(AuditLog::find().all(&db).await?.len(), 1);
        assert_eq!(sequence::last_sequence(&db, 2024, FundSphere::Ideal).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_earmark_negative_balance_is_a_warning() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("warning");
        let earmark = create_test_earmark(&db, "ROOF", Some(dec(100))).await?;

        let mut inflow =
            NewVoucher::new(ymd(2025, 3, 1), VoucherKind::In, FundSphere::Ideal).gross(dec(50));
        inflow.earmark_id = Some(earmark.id);
        let inflow = create_voucher(&db, &files, inflow, None).await?;
        assert!(inflow.warnings.is_empty());

        let mut outflow =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(200));
        outflow.earmark_id = Some(earmark.id);
        let outflow = create_voucher(&db, &files, outflow, None).await?;
        assert_eq!(outflow.warnings.len(), 1);
        assert!(get_voucher(&db, outflow.id).await?.is_some());

        let usage = allocation::earmark_usage(&db, earmark.id, None).await?;
        assert_eq!(usage.allocated, dec(50));
        assert_eq!(usage.released, dec(200));
        assert_eq!(usage.remaining, dec(-50));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_earmark_warning_ignores_old_rows() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("update_warning");
        let earmark = create_test_earmark(&db, "ROOF", Some(dec(100))).await?;

        let mut outflow =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(150));
        outflow.earmarks = vec![AllocationEntry::new(earmark.id, dec(80))];
        let outflow = create_voucher(&db, &files, outflow, None).await?;
        assert!(outflow.warnings.is_empty());

        let patch = VoucherPatch {
            earmarks: Some(vec![AllocationEntry::new(earmark.id, dec(150))]),
            ..Default::default()
        };
        let updated = update_voucher(&db, &files, outflow.id, patch, None).await?;
        // 100 - 150, not 100 - 80 - 150
        assert_eq!(updated.warnings.len(), 1);
        assert!(updated.warnings[0].contains("-50"));
        assert!(!updated.warnings[0].contains("-130"));

        let usage = allocation::earmark_usage(&db, earmark.id, None).await?;
        assert_eq!(usage.released, dec(150));
        assert_eq!(usage.remaining, dec(-50));
        Ok(())
    }

    #[tokio::test]
    async fn test_noop_update_repeats_earmark_warning() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("noop_warning");
        let earmark = create_test_earmark(&db, "ROOF", Some(dec(100))).await?;

        let mut outflow =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(150));
        outflow.earmark_id = Some(earmark.id);
        let outflow = create_voucher(&db, &files, outflow, None).await?;
        assert_eq!(outflow.warnings.len(), 1);

        let updated =
            update_voucher(&db, &files, outflow.id, VoucherPatch::default(), None).await?;
        assert_eq!(updated.warnings, outflow.warnings);
        Ok(())
    }

    #[tokio::test]
    async fn test_allow_negative_suppresses_warning() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("allow_negative");
        settings::set_value(&db, EARMARK_ALLOW_NEGATIVE, "true").await?;
        let earmark = create_test_earmark(&db, "ROOF", Some(dec(10))).await?;

        let mut outflow =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(200));
        outflow.earmark_id = Some(earmark.id);
        let outflow = create_voucher(&db, &files, outflow, None).await?;
        assert!(outflow.warnings.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_and_out_of_range_targets_are_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("targets");

        let inactive = create_test_earmark(&db, "OLD", None).await?;
        earmark::set_earmark_active(&db, inactive.id, false).await?;
        let mut input =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::In, FundSphere::Ideal).gross(dec(20));
        input.earmark_id = Some(inactive.id);
        let result = create_voucher(&db, &files, input, None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let ranged = create_ranged_earmark(&db, "SUMMER", ymd(2025, 6, 1), ymd(2025, 8, 31)).await?;
        let mut input =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::In, FundSphere::Ideal).gross(dec(20));
        input.earmark_id = Some(ranged.id);
        let result = create_voucher(&db, &files, input, None).await;
        assert!(matches!(result, Err(Error::OutOfRange { .. })));

        let mut input =
            NewVoucher::new(ymd(2025, 3, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(20));
        input.budget_id = Some(404);
        let result = create_voucher(&db, &files, input, None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert!(list_vouchers(&db, 2025, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_with_allocation_lists_and_tags() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("lists");
        let budget = create_test_budget(&db, "Youth work").await?;
        let other = create_test_budget(&db, "Sports").await?;

        let mut input =
            NewVoucher::new(ymd(2025, 4, 1), VoucherKind::Out, FundSphere::Ideal).gross(dec(100));
        input.budgets = vec![
            AllocationEntry::new(budget.id, dec(30)),
            AllocationEntry::new(other.id, dec(20)),
        ];
        input.tags = vec!["camp".to_string()];
        let created = create_voucher(&db, &files, input, None).await?;

        let snapshot = get_snapshot(&db, created.id).await?;
        assert_eq!(snapshot.budgets.len(), 2);
        assert_eq!(snapshot.tags, vec!["camp"]);
        assert_eq!(snapshot.voucher.budget_id, Some(budget.id));
        assert_eq!(snapshot.voucher.budget_amount, Some(dec(30)));
        Ok(())
    }

    #[tokio::test]
    async fn test_transfer_accounts_are_validated() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("transfer");

        let mut transfer =
            NewVoucher::new(ymd(2025, 4, 1), VoucherKind::Transfer, FundSphere::Ideal)
                .gross(dec(100));
        let result = create_voucher(&db, &files, transfer.clone(), None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        transfer.transfer_from = Some(PaymentMethod::Cash);
        transfer.transfer_to = Some(PaymentMethod::Bank);
        assert!(create_voucher(&db, &files, transfer, None).await.is_ok());

        let mut payment =
            NewVoucher::new(ymd(2025, 4, 1), VoucherKind::Out, FundSphere::Ideal).gross(dec(100));
        payment.transfer_to = Some(PaymentMethod::Bank);
        let result = create_voucher(&db, &files, payment, None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_tampered_counter_is_skipped() -> Result<()> {
        let db = setup_test_db().await?;
        for day in 1..=3 {
            create_test_voucher(&db, ymd(2025, 5, day), dec(10)).await?;
        }
        set_counter(&db, 2025, FundSphere::Ideal, 1).await?;

        // 2 and 3 are taken, 4 is free
        let created = create_test_voucher(&db, ymd(2025, 5, 4), dec(10)).await?;
        assert_eq!(created.seq_no, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_exhausted_after_five_collisions() -> Result<()> {
        let db = setup_test_db().await?;
        for day in 1..=5 {
            create_test_voucher(&db, ymd(2025, 5, day), dec(10)).await?;
        }
        set_counter(&db, 2025, FundSphere::Ideal, 0).await?;

        let result = create_test_voucher(&db, ymd(2025, 5, 6), dec(10)).await;
        assert!(matches!(
            result,
            Err(Error::SequenceExhausted { fiscal_year: 2025, attempts: 5, .. })
        ));

        // Rolled back: the counter still holds the tampered value
        let counter = SequenceCounter::find()
            .filter(sequence_counter::Column::FiscalYear.eq(2025))
            .one(&db)
            .await?
            .unwrap();
        assert_eq!(counter.last_seq_no, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_sphere_change_renumbers() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("renumber");
        create_test_voucher_in_sphere(&db, FundSphere::Asset, ymd(2025, 6, 1)).await?;
        let v = create_test_voucher(&db, ymd(2025, 6, 2), dec(10)).await?;
        assert_eq!(v.voucher_no, "2025-IB-00001");

        let patch = VoucherPatch {
            sphere: Some(FundSphere::Asset),
            ..Default::default()
        };
        let updated = update_voucher(&db, &files, v.id, patch, Some("bob")).await?;
        assert_eq!(updated.voucher_no, "2025-VM-00002");
        assert!(
            updated
                .warnings
                .iter()
                .any(|w| w.contains("2025-IB-00001") && w.contains("2025-VM-00002"))
        );

        let assets = list_vouchers(&db, 2025, Some(FundSphere::Asset)).await?;
        let seqs: Vec<i32> = assets.iter().map(|v| v.seq_no).collect();
        assert_eq!(seqs, vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_year_change_renumbers_and_same_year_does_not() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("year");
        let v = create_test_voucher(&db, ymd(2025, 6, 2), dec(10)).await?;

        let same_year = VoucherPatch {
            date: Some(ymd(2025, 9, 1)),
            ..Default::default()
        };
        let updated = update_voucher(&db, &files, v.id, same_year, None).await?;
        assert_eq!(updated.voucher_no, v.voucher_no);
        assert!(updated.warnings.is_empty());

        let next_year = VoucherPatch {
            date: Some(ymd(2026, 1, 3)),
            ..Default::default()
        };
        let updated = update_voucher(&db, &files, v.id, next_year, None).await?;
        assert_eq!(updated.voucher_no, "2026-IB-00001");
        assert_eq!(get_voucher(&db, v.id).await?.unwrap().fiscal_year, 2026);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_checks_old_and_new_date() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("update_lock");
        let old = create_test_voucher(&db, ymd(2024, 6, 1), dec(10)).await?;
        let open = create_test_voucher(&db, ymd(2025, 6, 1), dec(10)).await?;
        period_lock::close_through(&db, ymd(2024, 12, 31)).await?;

        let into_open = VoucherPatch {
            date: Some(ymd(2025, 2, 1)),
            ..Default::default()
        };
        let result = update_voucher(&db, &files, old.id, into_open, None).await;
        assert!(matches!(result, Err(Error::PeriodLocked { .. })));

        let into_closed = VoucherPatch {
            date: Some(ymd(2024, 12, 31)),
            ..Default::default()
        };
        let result = update_voucher(&db, &files, open.id, into_closed, None).await;
        assert!(matches!(result, Err(Error::PeriodLocked { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_recomputes_amounts() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("recompute");
        let input =
            NewVoucher::new(ymd(2025, 1, 10), VoucherKind::Out, FundSphere::Ideal)
                .net(dec(100), dec(19));
        let created = create_voucher(&db, &files, input, None).await?;

        let rate = VoucherPatch {
            vat_rate: Some(dec(7)),
            ..Default::default()
        };
        update_voucher(&db, &files, created.id, rate, None).await?;
        let row = get_voucher(&db, created.id).await?.unwrap();
        assert_eq!(row.gross_amount, dec(107));

        let gross = VoucherPatch {
            gross_amount: Some(dec(80)),
            ..Default::default()
        };
        update_voucher(&db, &files, created.id, gross, None).await?;
        let row = get_voucher(&db, created.id).await?.unwrap();
        assert_eq!(row.gross_amount, dec(80));
        assert_eq!(row.net_amount, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_audit_carries_full_snapshots() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("audit_update");
        let input =
            NewVoucher::new(ymd(2025, 6, 2), VoucherKind::Out, FundSphere::Ideal).gross(dec(10));
        let v = create_voucher(&db, &files, input, None).await?;

        let patch = VoucherPatch {
            description: Some(Some("Corrected".to_string())),
            tags: Some(vec!["fixed".to_string()]),
            ..Default::default()
        };
        update_voucher(&db, &files, v.id, patch, Some("carol")).await?;

        let trail = audit::history(&db, ENTITY_VOUCHER, v.id).await?;
        assert_eq!(trail.len(), 2);
        let update = &trail[1];
        assert_eq!(update.action, "UPDATE");
        assert_eq!(update.actor_id.as_deref(), Some("carol"));
        assert!(update.diff["before"]["voucher"]["description"].is_null());
        assert_eq!(update.diff["after"]["voucher"]["description"], "Corrected");
        assert_eq!(update.diff["after"]["tags"][0], "fixed");
        assert_eq!(update.diff["before"]["voucher"]["voucher_no"], v.voucher_no.as_str());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_unknown_voucher() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("unknown");
        let result = update_voucher(&db, &files, 77, VoucherPatch::default(), None).await;
        assert!(matches!(result, Err(Error::VoucherNotFound { id: 77 })));
        assert!(matches!(
            delete_voucher(&db, 77, None).await,
            Err(Error::VoucherNotFound { id: 77 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cascades_and_audits() -> Result<()> {
        let db = setup_test_db().await?;
        let files = test_attachment_store("delete");
        let budget = create_test_budget(&db, "Youth work").await?;

        let mut input =
            NewVoucher::new(ymd(2025, 4, 1), VoucherKind::Out, FundSphere::Ideal).gross(dec(100));
        input.budget_id = Some(budget.id);
        input.tags = vec!["camp".to_string()];
        input.attachments = vec![AttachmentInput {
            file_name: "bill.txt".to_string(),
            mime_type: None,
            bytes: b"42".to_vec(),
        }];
        let created = create_voucher(&db, &files, input, None).await?;

        delete_voucher(&db, created.id, Some("dave")).await?;
        assert!(get_voucher(&db, created.id).await?.is_none());
        assert!(allocation::list(&db, AllocationKind::Budget, created.id).await?.is_empty());
        assert!(tags::get_tags(&db, created.id).await?.is_empty());
        assert!(crate::core::attachments::list_files(&db, created.id).await?.is_empty());

        let trail = audit::history(&db, ENTITY_VOUCHER, created.id).await?;
        let last = trail.last().unwrap();
        assert_eq!(last.action, "DELETE");
        assert!(last.diff["after"].is_null());
        assert_eq!(last.diff["before"]["budgets"][0]["target_id"], budget.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_attachment_keeps_voucher() -> Result<()> {
        let db = setup_test_db().await?;
        // A regular file where the store expects a directory
        let blocker =
            std::env::temp_dir().join(format!("voucher-ledger-{}-blocker", std::process::id()));
        tokio::fs::write(&blocker, b"x").await?;
        let files = AttachmentStore::new(&blocker);

        let mut input =
            NewVoucher::new(ymd(2025, 4, 1), VoucherKind::In, FundSphere::Ideal).gross(dec(5));
        input.attachments = vec![AttachmentInput {
            file_name: "scan.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            bytes: vec![1, 2, 3],
        }];
        let result = create_voucher(&db, &files, input, None).await;
        assert!(matches!(result, Err(Error::Attachment { .. })));

        let stored = list_vouchers(&db, 2025, None).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].voucher_no, "2025-IB-00001");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_in_closed_period_fails() -> Result<()> {
        let db = setup_test_db().await?;
        let v = create_test_voucher(&db, ymd(2024, 6, 1), dec(10)).await?;
        period_lock::close_through(&db, ymd(2024, 12, 31)).await?;

        let result = delete_voucher(&db, v.id, None).await;
        assert!(matches!(result, Err(Error::PeriodLocked { .. })));
        assert!(get_voucher(&db, v.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_set_reversed_by_clears_link() -> Result<()> {
        let db = setup_test_db().await?;
        let v = create_test_voucher(&db, ymd(2025, 6, 1), dec(10)).await?;
        set_reversed_by(&db, v.id, Some(99)).await?;
        assert_eq!(get_voucher(&db, v.id).await?.unwrap().reversed_by_voucher_id, Some(99));
        set_reversed_by(&db, v.id, None).await?;
        assert_eq!(get_voucher(&db, v.id).await?.unwrap().reversed_by_voucher_id, None);
        Ok(())
    }
}
