//! Enumerations shared by several tables, stored as short text codes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a voucher.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum VoucherKind {
    #[sea_orm(string_value = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    Out,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
}

impl VoucherKind {
    /// Kind of the voucher that cancels this one. Transfers stay transfers.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
            Self::Transfer => Self::Transfer,
        }
    }
}

/// One of the four fund categories of a nonprofit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum FundSphere {
    /// Ideal purpose (membership fees, donations)
    #[sea_orm(string_value = "IDEELL")]
    Ideal,
    /// Charitable operations
    #[sea_orm(string_value = "ZWECK")]
    Charitable,
    /// Asset management
    #[sea_orm(string_value = "VERMOEGEN")]
    Asset,
    /// Commercial operations
    #[sea_orm(string_value = "WGB")]
    Commercial,
}

impl FundSphere {
    /// Short code used inside voucher numbers.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ideal => "IB",
            Self::Charitable => "ZB",
            Self::Asset => "VM",
            Self::Commercial => "WB",
        }
    }
}

impl fmt::Display for FundSphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Cash or bank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "BAR")]
    Cash,
    #[sea_orm(string_value = "BANK")]
    Bank,
}
