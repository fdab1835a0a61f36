//! Net / VAT / gross computation.
//!
//! A voucher is entered either from its net amount, in which case VAT and
//! gross are derived, or directly from its gross amount, in which case net and
//! VAT stay zero. The gross basis never infers a net amount.

use crate::errors::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Amount the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountBasis {
    Net(Decimal),
    Gross(Decimal),
}

impl AmountBasis {
    /// Exactly one of `net` and `gross` must be given.
    pub fn from_options(net: Option<Decimal>, gross: Option<Decimal>) -> Result<Self> {
        match (net, gross) {
            (Some(n), None) => Ok(Self::Net(n)),
            (None, Some(g)) => Ok(Self::Gross(g)),
            (None, None) => Err(Error::validation("Either a net or a gross amount is required")),
            (Some(_), Some(_)) => Err(Error::validation(
                "Give either a net or a gross amount, not both",
            )),
        }
    }
}

/// Stored amount columns of a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Amounts {
    /// Net amount, zero on the gross basis
    pub net: Decimal,
    /// VAT rate in percent
    pub vat_rate: Decimal,
    /// VAT amount, zero on the gross basis
    pub vat: Decimal,
    /// Gross amount
    pub gross: Decimal,
}

impl Amounts {
    /// Sign-inverted amounts; the VAT rate is kept.
    #[must_use]
    pub fn negated(self) -> Self {
        Self {
            net: -self.net,
            vat_rate: self.vat_rate,
            vat: -self.vat,
            gross: -self.gross,
        }
    }
}

/// Rounds to cents, halves away from zero.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derives the stored amounts from the supplied basis and VAT rate (percent).
#[must_use]
pub fn compute_amounts(basis: AmountBasis, vat_rate: Decimal) -> Amounts {
    match basis {
        AmountBasis::Net(net) => {
            let net = round2(net);
            let vat = round2(net * vat_rate / Decimal::ONE_HUNDRED);
            Amounts {
                net,
                vat_rate,
                vat,
                gross: round2(net + vat),
            }
        }
        AmountBasis::Gross(gross) => Amounts {
            net: Decimal::ZERO,
            vat_rate,
            vat: Decimal::ZERO,
            gross: round2(gross),
        },
    }
}
