/// Allocation of voucher amounts to budgets and earmarks, plus balance queries
pub mod allocation;

/// Net / VAT / gross computation
pub mod amounts;

/// File attachments written after a voucher commits
pub mod attachments;

/// Append-only audit trail
pub mod audit;

/// Budget metadata
pub mod budget;

/// Earmarked fund metadata
pub mod earmark;

/// Closed-period guard
pub mod period_lock;

/// Storno vouchers
pub mod reversal;

/// Per-year, per-sphere voucher numbering
pub mod sequence;

/// Key-value runtime settings
pub mod settings;

/// Free-form voucher tags
pub mod tags;

/// Voucher create / update / delete and reads
pub mod voucher;
