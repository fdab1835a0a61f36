//! Entity module - Contains all SeaORM entity definitions for the ledger tables.
//! Each entity has a Model struct for data and an Entity struct for operations.

/// Append-only audit rows
pub mod audit_log;
/// Planned budgets
pub mod budget;
/// Voucher-to-budget allocation rows
pub mod budget_allocation;
/// Earmarked funds
pub mod earmark;
/// Voucher-to-earmark allocation rows
pub mod earmark_allocation;
/// Text-backed enums shared by several tables
pub mod enums;
/// Voucher number counters
pub mod sequence_counter;
/// Key-value runtime settings
pub mod setting;
/// Tag names
pub mod tag;
/// Vouchers
pub mod voucher;
/// Attachment records
pub mod voucher_file;
/// Voucher tag assignments
pub mod voucher_tag;

// Re-export specific types to avoid conflicts
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use budget::{Column as BudgetColumn, Entity as Budget, Model as BudgetModel};
pub use budget_allocation::{
    Column as BudgetAllocationColumn, Entity as BudgetAllocation, Model as BudgetAllocationModel,
};
pub use earmark::{Column as EarmarkColumn, Entity as Earmark, Model as EarmarkModel};
pub use earmark_allocation::{
    Column as EarmarkAllocationColumn, Entity as EarmarkAllocation,
    Model as EarmarkAllocationModel,
};
pub use enums::{FundSphere, PaymentMethod, VoucherKind};
pub use sequence_counter::{
    Column as SequenceCounterColumn, Entity as SequenceCounter, Model as SequenceCounterModel,
};
pub use setting::{Column as SettingColumn, Entity as Setting, Model as SettingModel};
pub use tag::{Column as TagColumn, Entity as Tag, Model as TagModel};
pub use voucher::{Column as VoucherColumn, Entity as Voucher, Model as VoucherModel};
pub use voucher_file::{
    Column as VoucherFileColumn, Entity as VoucherFile, Model as VoucherFileModel,
};
pub use voucher_tag::{Column as VoucherTagColumn, Entity as VoucherTag, Model as VoucherTagModel};
