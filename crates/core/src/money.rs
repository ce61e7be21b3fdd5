//! Money policy: rounding and the tolerances applied to monetary comparisons.
//!
//! These values encode business judgement, so they live here as named,
//! configurable types instead of literals scattered through the calculations.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};
use crate::value_object::ValueObject;

/// Number of decimal places monetary amounts are stored with.
pub const MONEY_SCALE: u32 = 2;

/// How amounts are rounded to [`MONEY_SCALE`] decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyRounding {
    /// 0.005 rounds to 0.01 (commercial rounding).
    #[default]
    HalfAwayFromZero,
    /// 0.005 rounds to the even neighbour (banker's rounding).
    HalfEven,
}

impl MoneyRounding {
    pub fn round(&self, amount: Decimal) -> Decimal {
        let strategy = match self {
            MoneyRounding::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            MoneyRounding::HalfEven => RoundingStrategy::MidpointNearestEven,
        };
        amount.round_dp_with_strategy(MONEY_SCALE, strategy)
    }
}

impl ValueObject for MoneyRounding {}

/// Slack allowed when the applied amounts of a payment are compared with its total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTolerance {
    /// Fraction of the payment total (0.01 = 1%).
    pub ratio: Decimal,
}

impl AllocationTolerance {
    pub fn new(ratio: Decimal) -> BillingResult<Self> {
        if ratio.is_sign_negative() {
            return Err(BillingError::validation("allocation tolerance must not be negative"));
        }
        Ok(Self { ratio })
    }

    /// Largest sum of applied amounts accepted for a payment of `total`.
    pub fn limit(&self, total: Decimal) -> Decimal {
        total * (Decimal::ONE + self.ratio)
    }

    pub fn permits(&self, applied: Decimal, total: Decimal) -> bool {
        applied <= self.limit(total)
    }
}

impl Default for AllocationTolerance {
    fn default() -> Self {
        Self {
            ratio: Decimal::new(1, 2),
        }
    }
}

impl ValueObject for AllocationTolerance {}

/// Bounds outside of which a payment amount is reported as unusual relative to
/// the balance it is meant to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountReviewThresholds {
    /// Below `low × balance` the amount is unusually low (0.10 = 10%).
    pub low: Decimal,
    /// Above `high × balance` the amount is unusually high (1.10 = 110%).
    pub high: Decimal,
}

impl AmountReviewThresholds {
    pub fn new(low: Decimal, high: Decimal) -> BillingResult<Self> {
        if low.is_sign_negative() || high < low {
            return Err(BillingError::validation(format!(
                "review thresholds must satisfy 0 <= low <= high (low={low}, high={high})"
            )));
        }
        Ok(Self { low, high })
    }
}

impl Default for AmountReviewThresholds {
    fn default() -> Self {
        Self {
            low: Decimal::new(10, 2),
            high: Decimal::new(110, 2),
        }
    }
}

impl ValueObject for AmountReviewThresholds {}
