//! Voucher entity - a single-sided cash voucher.
//!
//! `voucher_no` is unique and so is the `(fiscal_year, sphere, seq_no)` triple; the
//! latter is enforced by an explicit index created alongside the table. The
//! `earmark_*` and `budget_*` columns are a read projection of the first
//! allocation row of each kind.

use super::enums::{FundSphere, PaymentMethod, VoucherKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Voucher database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    /// Unique identifier for the voucher
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Calendar year of `date`
    pub fiscal_year: i32,
    /// Sequence within `(fiscal_year, sphere)`
    pub seq_no: i32,
    /// Human-readable number, e.g. `2025-IB-00017`
    #[sea_orm(unique)]
    pub voucher_no: String,
    /// Booking date
    pub date: Date,
    /// IN, OUT or TRANSFER
    pub kind: VoucherKind,
    /// Fund sphere
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
    /// Net amount, zero when entered gross
    pub net_amount: Decimal,
    /// Percent, e.g. `19`
    pub vat_rate: Decimal,
    /// VAT amount
    pub vat_amount: Decimal,
    /// Gross amount
    pub gross_amount: Decimal,
    /// First earmark allocation
    pub earmark_id: Option<i64>,
    /// Amount of the first earmark allocation
    pub earmark_amount: Option<Decimal>,
    /// First budget allocation
    pub budget_id: Option<i64>,
    /// Amount of the first budget allocation
    pub budget_amount: Option<Decimal>,
    /// Who created the voucher, if known
    pub created_by: Option<String>,
    /// When the voucher was created
    pub created_at: DateTimeUtc,
    /// When the voucher was last changed
    pub updated_at: DateTimeUtc,
    /// Set when a period close covered this voucher
    pub locked_at: Option<DateTimeUtc>,
    /// Reversal voucher cancelling this one
    pub reversed_by_voucher_id: Option<i64>,
    /// Voucher this one reverses
    pub original_voucher_id: Option<i64>,
}

/// Defines relationships between Voucher and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::budget_allocation::Entity")]
    BudgetAllocations,
    #[sea_orm(has_many = "super::earmark_allocation::Entity")]
    EarmarkAllocations,
    #[sea_orm(has_many = "super::voucher_file::Entity")]
    Files,
    #[sea_orm(has_many = "super::voucher_tag::Entity")]
    Tags,
}

impl Related<super::budget_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetAllocations.def()
    }
}

impl Related<super::earmark_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EarmarkAllocations.def()
    }
}

impl Related<super::voucher_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl Related<super::voucher_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
