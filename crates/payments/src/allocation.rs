//! Spreading one payment over several invoices.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use cyclebill_core::{
    AllocationTolerance, AmountReviewThresholds, BillingError, BillingResult, InvoiceId, MONEY_SCALE,
    PaymentId,
};

/// Portion of a payment attributed to one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInvoiceLink {
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub applied_amount: Decimal,
}

/// Split `total` across invoices in proportion to their outstanding balances.
///
/// Negative balances count as zero and receive nothing. Shares are cut to
/// cents and the leftover cents go to the largest remainders (ties to the
/// earlier invoice), so the shares add up to `total` exactly whenever `total`
/// is a whole number of cents.
pub fn derive_applied_amounts(total: Decimal, balances: &[Decimal]) -> BillingResult<Vec<Decimal>> {
    let balances: Vec<Decimal> = balances.iter().map(|b| (*b).max(Decimal::ZERO)).collect();
    let total_balance: Decimal = balances.iter().copied().sum();
    if total_balance <= Decimal::ZERO {
        return Err(BillingError::NoOutstandingBalance);
    }

    let exact: Vec<Decimal> = balances.iter().map(|b| total * *b / total_balance).collect();
    let mut shares: Vec<Decimal> = exact
        .iter()
        .map(|e| e.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero))
        .collect();

    let mut order: Vec<usize> = (0..balances.len()).filter(|&i| balances[i] > Decimal::ZERO).collect();
    order.sort_by(|&a, &b| (exact[b] - shares[b]).cmp(&(exact[a] - shares[a])).then(a.cmp(&b)));

    let cent = Decimal::new(1, MONEY_SCALE);
    let mut leftover = total - shares.iter().copied().sum::<Decimal>();
    for idx in order {
        if leftover < cent {
            break;
        }
        shares[idx] += cent;
        leftover -= cent;
    }
    Ok(shares)
}

/// Check caller-supplied or derived applied amounts against the payment total.
pub fn validate_applied_amounts(
    applied: &[Decimal],
    total: Decimal,
    tolerance: &AllocationTolerance,
) -> BillingResult<()> {
    if applied.iter().any(|a| a.is_sign_negative()) {
        return Err(BillingError::validation("applied amounts must not be negative"));
    }
    let sum: Decimal = applied.iter().copied().sum();
    if !tolerance.permits(sum, total) {
        return Err(BillingError::OverAllocation {
            applied: sum,
            limit: tolerance.limit(total),
        });
    }
    Ok(())
}

/// How a payment compares with the balance it is meant to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountReview {
    WithinRange,
    UnusuallyLow,
    UnusuallyHigh,
}

impl AmountReview {
    pub fn is_unusual(&self) -> bool {
        !matches!(self, AmountReview::WithinRange)
    }
}

pub fn review_amount(total: Decimal, outstanding: Decimal, thresholds: &AmountReviewThresholds) -> AmountReview {
    if outstanding <= Decimal::ZERO {
        return if total > Decimal::ZERO {
            AmountReview::UnusuallyHigh
        } else {
            AmountReview::WithinRange
        };
    }
    if total < outstanding * thresholds.low {
        AmountReview::UnusuallyLow
    } else if total > outstanding * thresholds.high {
        AmountReview::UnusuallyHigh
    } else {
        AmountReview::WithinRange
    }
}
