//! First-invoice proration under the fixed day-of-month billing cycle.
//!
//! The cycle runs from the anchor day (the 5th) of one month to the anchor day
//! of the next and is always valued as 30 days. A customer joining after the
//! anchor day pays only for the days left until the next anchor, both ends
//! included.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cyclebill_core::{BillingError, BillingMonth, BillingResult, MoneyRounding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationPolicy {
    /// Day of month the cycle starts on. Joining on or before it bills a full month.
    pub anchor_day: u32,
    /// Days a cycle is valued as when deriving the daily cost.
    pub cycle_days: u32,
    pub rounding: MoneyRounding,
}

impl ProrationPolicy {
    pub fn validate(&self) -> BillingResult<()> {
        if !(1..=28).contains(&self.anchor_day) {
            return Err(BillingError::validation(format!(
                "proration anchor day must be within 1..=28, got {}",
                self.anchor_day
            )));
        }
        if self.cycle_days == 0 {
            return Err(BillingError::validation("proration cycle must span at least one day"));
        }
        Ok(())
    }
}

impl Default for ProrationPolicy {
    fn default() -> Self {
        Self {
            anchor_day: 5,
            cycle_days: 30,
            rounding: MoneyRounding::default(),
        }
    }
}

/// Days billed on a first invoice, or `None` when the full price applies.
pub fn billed_days(enrolled_on: NaiveDate, month: BillingMonth, policy: &ProrationPolicy) -> Option<i64> {
    if enrolled_on > month.last_day() || enrolled_on < month.first_day() {
        return None;
    }
    if enrolled_on.day() <= policy.anchor_day {
        return None;
    }
    let next_anchor = month.next().day(policy.anchor_day);
    Some((next_anchor - enrolled_on).num_days() + 1)
}

/// Amount of a customer's first primary-category invoice line.
///
/// Never exceeds `unit_price`.
pub fn first_invoice_amount(
    enrolled_on: NaiveDate,
    unit_price: Decimal,
    month: BillingMonth,
    policy: &ProrationPolicy,
) -> Decimal {
    let Some(days) = billed_days(enrolled_on, month, policy) else {
        return unit_price;
    };
    let cost_per_day = unit_price / Decimal::from(policy.cycle_days.max(1));
    // An overflowing product is above any representable price.
    match Decimal::from(days).checked_mul(cost_per_day) {
        Some(amount) => policy.rounding.round(amount).min(unit_price),
        None => unit_price,
    }
}
