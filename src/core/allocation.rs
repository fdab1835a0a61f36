//! Allocation ledger - partial assignment of voucher amounts to budgets and earmarks.
//!
//! A voucher may carry any number of allocation rows per kind, each with its own
//! amount. The rows do not have to add up to the voucher's gross amount. The
//! voucher's single-valued `budget_*` / `earmark_*` columns mirror the first row
//! of each kind (lowest id) and are refreshed after every allocation mutation.
//!
//! Functions ending in `_in` run inside a caller-supplied connection or
//! transaction and perform no period-lock or audit work; the public wrappers
//! open their own transaction, check the voucher's period and write the audit
//! row.

use crate::{
    core::{
        audit::{self, AuditAction},
        budget::in_range,
        period_lock,
    },
    entities::{
        Budget, BudgetAllocation, Earmark, EarmarkAllocation, Voucher, VoucherKind,
        budget_allocation, earmark_allocation, voucher,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    QueryOrder, QueryTrait, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument};

/// Which junction table an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationKind {
    Budget,
    Earmark,
}

impl AllocationKind {
    /// Entity type used in audit rows.
    #[must_use]
    pub const fn entity_type(self) -> &'static str {
        match self {
            Self::Budget => "budget_allocation",
            Self::Earmark => "earmark_allocation",
        }
    }
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Budget => f.write_str("budget"),
            Self::Earmark => f.write_str("earmark"),
        }
    }
}

/// One allocation row, independent of its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Row id in its allocation table
    pub id: i64,
    /// Voucher the amount is taken from
    pub voucher_id: i64,
    /// Budget or earmark id, depending on the kind
    pub target_id: i64,
    /// Allocated amount, always positive
    pub amount: Decimal,
    /// When the row was written
    pub created_at: DateTime<Utc>,
}

impl From<budget_allocation::Model> for Allocation {
    fn from(m: budget_allocation::Model) -> Self {
        Self {
            id: m.id,
            voucher_id: m.voucher_id,
            target_id: m.budget_id,
            amount: m.amount,
            created_at: m.created_at,
        }
    }
}

impl From<earmark_allocation::Model> for Allocation {
    fn from(m: earmark_allocation::Model) -> Self {
        Self {
            id: m.id,
            voucher_id: m.voucher_id,
            target_id: m.earmark_id,
            amount: m.amount,
            created_at: m.created_at,
        }
    }
}

/// Requested allocation of `amount` to one budget or earmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    /// Budget or earmark id
    pub target_id: i64,
    /// Amount to allocate, must be positive
    pub amount: Decimal,
}

impl AllocationEntry {
    /// Allocation of `amount` to `target_id`.
    #[must_use]
    pub const fn new(target_id: i64, amount: Decimal) -> Self {
        Self { target_id, amount }
    }
}

/// Flows of an earmark up to a reporting date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarmarkUsage {
    /// Earmark the figures belong to
    pub earmark_id: i64,
    /// Sum over allocations of IN vouchers
    pub allocated: Decimal,
    /// Sum over allocations of OUT vouchers
    pub released: Decimal,
    /// `allocated - released`
    pub balance: Decimal,
    /// Cap configured on the earmark
    pub capital_cap: Option<Decimal>,
    /// `capital_cap + balance`, a missing cap counting as zero
    pub remaining: Decimal,
}

/// Informational consumption of a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetUsage {
    /// Budget the figures belong to
    pub budget_id: i64,
    /// Planned amount of the budget
    pub planned: Decimal,
    /// Sum over allocations of OUT vouchers
    pub spent: Decimal,
    /// Sum over allocations of IN vouchers
    pub inflow: Decimal,
    /// `planned - spent + inflow`
    pub remaining: Decimal,
}

// ---------------------------------------------------------------------------
// In-transaction building blocks
// ---------------------------------------------------------------------------

/// Allocation rows of a voucher, oldest first.
pub(crate) async fn list_in<C>(
    db: &C,
    kind: AllocationKind,
    voucher_id: i64,
) -> Result<Vec<Allocation>>
where
    C: ConnectionTrait,
{
    let rows = match kind {
        AllocationKind::Budget => BudgetAllocation::find()
            .filter(budget_allocation::Column::VoucherId.eq(voucher_id))
            .order_by_asc(budget_allocation::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(Allocation::from)
            .collect(),
        AllocationKind::Earmark => EarmarkAllocation::find()
            .filter(earmark_allocation::Column::VoucherId.eq(voucher_id))
            .order_by_asc(earmark_allocation::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(Allocation::from)
            .collect(),
    };
    Ok(rows)
}

/// Rejects non-positive amounts and repeated targets.
pub(crate) fn check_entries(kind: AllocationKind, entries: &[AllocationEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.amount <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "Allocation amount for {kind} {} must be positive, got {}",
                entry.target_id, entry.amount
            )));
        }
        if !seen.insert(entry.target_id) {
            return Err(Error::validation(format!(
                "{kind} {} is allocated more than once",
                entry.target_id
            )));
        }
    }
    Ok(())
}

/// The target must exist, be active and, when it enforces a date range,
/// contain `date`.
pub(crate) async fn validate_target<C>(
    db: &C,
    kind: AllocationKind,
    target_id: i64,
    date: NaiveDate,
) -> Result<()>
where
    C: ConnectionTrait,
{
    match kind {
        AllocationKind::Budget => {
            let budget = Budget::find_by_id(target_id)
                .one(db)
                .await?
                .ok_or_else(|| Error::validation(format!("Budget {target_id} not found")))?;
            if budget.is_archived {
                return Err(Error::validation(format!("Budget {} is archived", budget.name)));
            }
            if budget.enforce_date_range && !in_range(date, budget.start_date, budget.end_date) {
                return Err(Error::OutOfRange {
                    target: format!("budget {}", budget.name),
                    date,
                });
            }
        }
        AllocationKind::Earmark => {
            let earmark = Earmark::find_by_id(target_id)
                .one(db)
                .await?
                .ok_or_else(|| Error::validation(format!("Earmark {target_id} not found")))?;
            if !earmark.is_active {
                return Err(Error::validation(format!("Earmark {} is inactive", earmark.code)));
            }
            if earmark.enforce_date_range && !in_range(date, earmark.start_date, earmark.end_date) {
                return Err(Error::OutOfRange {
                    target: format!("earmark {}", earmark.code),
                    date,
                });
            }
        }
    }
    Ok(())
}

async fn insert_in<C>(
    db: &C,
    kind: AllocationKind,
    voucher_id: i64,
    entry: AllocationEntry,
) -> Result<Allocation>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let row = match kind {
        AllocationKind::Budget => budget_allocation::ActiveModel {
            voucher_id: Set(voucher_id),
            budget_id: Set(entry.target_id),
            amount: Set(entry.amount),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?
        .into(),
        AllocationKind::Earmark => earmark_allocation::ActiveModel {
            voucher_id: Set(voucher_id),
            earmark_id: Set(entry.target_id),
            amount: Set(entry.amount),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?
        .into(),
    };
    Ok(row)
}

async fn delete_for_voucher_in<C>(db: &C, kind: AllocationKind, voucher_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let removed = match kind {
        AllocationKind::Budget => {
            BudgetAllocation::delete_many()
                .filter(budget_allocation::Column::VoucherId.eq(voucher_id))
                .exec(db)
                .await?
                .rows_affected
        }
        AllocationKind::Earmark => {
            EarmarkAllocation::delete_many()
                .filter(earmark_allocation::Column::VoucherId.eq(voucher_id))
                .exec(db)
                .await?
                .rows_affected
        }
    };
    Ok(removed)
}

/// Removes every allocation row of a voucher, both kinds.
pub(crate) async fn delete_all_for_voucher_in<C>(db: &C, voucher_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    delete_for_voucher_in(db, AllocationKind::Budget, voucher_id).await?;
    delete_for_voucher_in(db, AllocationKind::Earmark, voucher_id).await?;
    Ok(())
}

/// Copies the first row of `kind` into the voucher's single-valued columns,
/// or clears them when no row is left.
pub(crate) async fn sync_legacy_columns_in<C>(
    db: &C,
    kind: AllocationKind,
    voucher_id: i64,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let first = list_in(db, kind, voucher_id).await?.into_iter().next();
    let (id_col, amount_col) = match kind {
        AllocationKind::Budget => (voucher::Column::BudgetId, voucher::Column::BudgetAmount),
        AllocationKind::Earmark => (voucher::Column::EarmarkId, voucher::Column::EarmarkAmount),
    };

    Voucher::update_many()
        .col_expr(id_col, Expr::value(first.as_ref().map(|a| a.target_id)))
        .col_expr(amount_col, Expr::value(first.as_ref().map(|a| a.amount)))
        .filter(voucher::Column::Id.eq(voucher_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Deletes the voucher's rows of `kind` and inserts `entries` in order.
pub(crate) async fn replace_all_in<C>(
    db: &C,
    kind: AllocationKind,
    voucher_id: i64,
    entries: &[AllocationEntry],
) -> Result<Vec<Allocation>>
where
    C: ConnectionTrait,
{
    check_entries(kind, entries)?;
    delete_for_voucher_in(db, kind, voucher_id).await?;

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        rows.push(insert_in(db, kind, voucher_id, *entry).await?);
    }

    sync_legacy_columns_in(db, kind, voucher_id).await?;
    Ok(rows)
}

/// Sets the amount of the `(voucher, target)` row, inserting it if missing.
async fn upsert_in<C>(
    db: &C,
    kind: AllocationKind,
    voucher_id: i64,
    entry: AllocationEntry,
) -> Result<Allocation>
where
    C: ConnectionTrait,
{
    let row = match kind {
        AllocationKind::Budget => {
            let existing = BudgetAllocation::find()
                .filter(budget_allocation::Column::VoucherId.eq(voucher_id))
                .filter(budget_allocation::Column::BudgetId.eq(entry.target_id))
                .one(db)
                .await?;
            match existing {
                Some(row) => {
                    let mut active: budget_allocation::ActiveModel = row.into();
                    active.amount = Set(entry.amount);
                    active.update(db).await?.into()
                }
                None => insert_in(db, kind, voucher_id, entry).await?,
            }
        }
        AllocationKind::Earmark => {
            let existing = EarmarkAllocation::find()
                .filter(earmark_allocation::Column::VoucherId.eq(voucher_id))
                .filter(earmark_allocation::Column::EarmarkId.eq(entry.target_id))
                .one(db)
                .await?;
            match existing {
                Some(row) => {
                    let mut active: earmark_allocation::ActiveModel = row.into();
                    active.amount = Set(entry.amount);
                    active.update(db).await?.into()
                }
                None => insert_in(db, kind, voucher_id, entry).await?,
            }
        }
    };
    Ok(row)
}

/// IN and OUT sums over a target's allocation rows, optionally limited to
/// vouchers dated on or before `as_of` and skipping one voucher.
async fn flows_in<C>(
    db: &C,
    kind: AllocationKind,
    target_id: i64,
    as_of: Option<NaiveDate>,
    exclude_voucher: Option<i64>,
) -> Result<(Decimal, Decimal)>
where
    C: ConnectionTrait,
{
    let rows: Vec<(Decimal, Option<voucher::Model>)> = match kind {
        AllocationKind::Budget => BudgetAllocation::find()
            .filter(budget_allocation::Column::BudgetId.eq(target_id))
            .apply_if(exclude_voucher, |q, id| {
                q.filter(budget_allocation::Column::VoucherId.ne(id))
            })
            .find_also_related(Voucher)
            .apply_if(as_of, |q, d| q.filter(voucher::Column::Date.lte(d)))
            .all(db)
            .await?
            .into_iter()
            .map(|(a, v)| (a.amount, v))
            .collect(),
        AllocationKind::Earmark => EarmarkAllocation::find()
            .filter(earmark_allocation::Column::EarmarkId.eq(target_id))
            .apply_if(exclude_voucher, |q, id| {
                q.filter(earmark_allocation::Column::VoucherId.ne(id))
            })
            .find_also_related(Voucher)
            .apply_if(as_of, |q, d| q.filter(voucher::Column::Date.lte(d)))
            .all(db)
            .await?
            .into_iter()
            .map(|(a, v)| (a.amount, v))
            .collect(),
    };

    let mut inflow = Decimal::ZERO;
    let mut outflow = Decimal::ZERO;
    for (amount, voucher) in rows {
        match voucher.map(|v| v.kind) {
            Some(VoucherKind::In) => inflow += amount,
            Some(VoucherKind::Out) => outflow += amount,
            Some(VoucherKind::Transfer) | None => {}
        }
    }
    Ok((inflow, outflow))
}

/// Earmark usage as of `as_of` (all dates when `None`), ignoring
/// `exclude_voucher` so an amended voucher is not counted twice.
pub(crate) async fn earmark_usage_in<C>(
    db: &C,
    earmark_id: i64,
    as_of: Option<NaiveDate>,
    exclude_voucher: Option<i64>,
) -> Result<EarmarkUsage>
where
    C: ConnectionTrait,
{
    let earmark = Earmark::find_by_id(earmark_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::validation(format!("Earmark {earmark_id} not found")))?;

    let (allocated, released) =
        flows_in(db, AllocationKind::Earmark, earmark_id, as_of, exclude_voucher).await?;
    let balance = allocated - released;

    Ok(EarmarkUsage {
        earmark_id,
        allocated,
        released,
        balance,
        capital_cap: earmark.capital_cap,
        remaining: earmark.capital_cap.unwrap_or(Decimal::ZERO) + balance,
    })
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

async fn load_open_voucher<C>(db: &C, voucher_id: i64) -> Result<voucher::Model>
where
    C: ConnectionTrait,
{
    let voucher = Voucher::find_by_id(voucher_id)
        .one(db)
        .await?
        .ok_or(Error::VoucherNotFound { id: voucher_id })?;
    period_lock::ensure_date_open(db, voucher.date).await?;
    Ok(voucher)
}

async fn audit_change<C>(
    db: &C,
    actor_id: Option<&str>,
    kind: AllocationKind,
    voucher_id: i64,
    before: &[Allocation],
    after: &[Allocation],
) -> Result<()>
where
    C: ConnectionTrait,
{
    let diff = audit::snapshot_diff(Some(&before), Some(&after))?;
    audit::record(db, actor_id, kind.entity_type(), voucher_id, AuditAction::Allocate, diff).await?;
    Ok(())
}

/// Allocation rows of a voucher, oldest first.
#[instrument(skip(db))]
pub async fn list(
    db: &DatabaseConnection,
    kind: AllocationKind,
    voucher_id: i64,
) -> Result<Vec<Allocation>> {
    let rows = list_in(db, kind, voucher_id).await?;
    debug!("Voucher {voucher_id} has {} {kind} allocations", rows.len());
    Ok(rows)
}

/// Replaces all rows of `kind` for a voucher with `entries`.
///
/// Every target must exist and be active at the voucher's date. An empty
/// `entries` clears the allocations and the mirrored single-valued columns.
#[instrument(skip(db, entries))]
pub async fn replace_all(
    db: &DatabaseConnection,
    kind: AllocationKind,
    voucher_id: i64,
    entries: &[AllocationEntry],
    actor_id: Option<&str>,
) -> Result<Vec<Allocation>> {
    check_entries(kind, entries)?;

    let txn = db.begin().await?;
    let voucher = load_open_voucher(&txn, voucher_id).await?;
    for entry in entries {
        validate_target(&txn, kind, entry.target_id, voucher.date).await?;
    }

    let before = list_in(&txn, kind, voucher_id).await?;
    let after = replace_all_in(&txn, kind, voucher_id, entries).await?;
    audit_change(&txn, actor_id, kind, voucher_id, &before, &after).await?;

    txn.commit().await?;
    info!("Replaced {kind} allocations of voucher {voucher_id}: {} rows", after.len());
    Ok(after)
}

/// Sets the allocation of `amount` from a voucher to one target, creating the
/// row if it does not exist yet.
#[instrument(skip(db))]
pub async fn add_one(
    db: &DatabaseConnection,
    kind: AllocationKind,
    voucher_id: i64,
    target_id: i64,
    amount: Decimal,
    actor_id: Option<&str>,
) -> Result<Allocation> {
    let entry = AllocationEntry::new(target_id, amount);
    check_entries(kind, &[entry])?;

    let txn = db.begin().await?;
    let voucher = load_open_voucher(&txn, voucher_id).await?;
    validate_target(&txn, kind, target_id, voucher.date).await?;

    let before = list_in(&txn, kind, voucher_id).await?;
    let row = upsert_in(&txn, kind, voucher_id, entry).await?;
    sync_legacy_columns_in(&txn, kind, voucher_id).await?;
    let after = list_in(&txn, kind, voucher_id).await?;
    audit_change(&txn, actor_id, kind, voucher_id, &before, &after).await?;

    txn.commit().await?;
    info!("Allocated {amount} of voucher {voucher_id} to {kind} {target_id}");
    Ok(row)
}

/// Deletes one allocation row by id.
#[instrument(skip(db))]
pub async fn remove_one(
    db: &DatabaseConnection,
    kind: AllocationKind,
    allocation_id: i64,
    actor_id: Option<&str>,
) -> Result<()> {
    let txn = db.begin().await?;

    let voucher_id = match kind {
        AllocationKind::Budget => BudgetAllocation::find_by_id(allocation_id)
            .one(&txn)
            .await?
            .map(|a| a.voucher_id),
        AllocationKind::Earmark => EarmarkAllocation::find_by_id(allocation_id)
            .one(&txn)
            .await?
            .map(|a| a.voucher_id),
    }
    .ok_or(Error::AllocationNotFound { id: allocation_id })?;

    load_open_voucher(&txn, voucher_id).await?;

    let before = list_in(&txn, kind, voucher_id).await?;
    match kind {
        AllocationKind::Budget => {
            BudgetAllocation::delete_by_id(allocation_id).exec(&txn).await?;
        }
        AllocationKind::Earmark => {
            EarmarkAllocation::delete_by_id(allocation_id).exec(&txn).await?;
        }
    }
    sync_legacy_columns_in(&txn, kind, voucher_id).await?;
    let after = list_in(&txn, kind, voucher_id).await?;
    audit_change(&txn, actor_id, kind, voucher_id, &before, &after).await?;

    txn.commit().await?;
    info!("Removed {kind} allocation {allocation_id} from voucher {voucher_id}");
    Ok(())
}

/// Sum of all allocation amounts of `kind` on a voucher.
pub async fn total_allocated(
    db: &DatabaseConnection,
    kind: AllocationKind,
    voucher_id: i64,
) -> Result<Decimal> {
    Ok(list_in(db, kind, voucher_id)
        .await?
        .iter()
        .map(|a| a.amount)
        .sum())
}

/// Earmark balance over vouchers dated on or before `as_of` (all when `None`).
#[instrument(skip(db))]
pub async fn earmark_usage(
    db: &DatabaseConnection,
    earmark_id: i64,
    as_of: Option<NaiveDate>,
) -> Result<EarmarkUsage> {
    earmark_usage_in(db, earmark_id, as_of, None).await
}

/// Budget consumption over vouchers dated on or before `as_of` (all when
/// `None`). Informational only; nothing enforces the planned amount.
#[instrument(skip(db))]
pub async fn budget_usage(
    db: &DatabaseConnection,
    budget_id: i64,
    as_of: Option<NaiveDate>,
) -> Result<BudgetUsage> {
    let budget = Budget::find_by_id(budget_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::validation(format!("Budget {budget_id} not found")))?;

    let (inflow, spent) = flows_in(db, AllocationKind::Budget, budget_id, as_of, None).await?;
    Ok(BudgetUsage {
        budget_id,
        planned: budget.planned_amount,
        spent,
        inflow,
        remaining: budget.planned_amount - spent + inflow,
    })
}
