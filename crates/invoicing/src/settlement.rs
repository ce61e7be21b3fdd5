//! Settlement state machine.
//!
//! ```text
//! Pending ──(paid ≥ amount)──▶ Paid
//!    ▲                           │
//!    └──(paid < amount, reversal)┘
//! Pending ──(manual)──▶ Cancelled   (terminal)
//! ```
//!
//! Every Pending→Paid edge must be mirrored by exactly one
//! `Customer::record_settled`, every Paid→Pending edge by exactly one
//! `Customer::record_reopened`. [`SettlementTransition::apply_to`] does that.

use rust_decimal::Decimal;

use cyclebill_core::{BillingError, BillingResult};
use cyclebill_customers::Customer;

use crate::invoice::{Invoice, InvoiceStatus};

/// Edge crossed by a settlement evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTransition {
    /// Pending → Paid.
    Settled,
    /// Paid → Pending.
    Reopened,
}

impl SettlementTransition {
    /// Mirror the edge on the owning customer's paid-invoice counter.
    pub fn apply_to(&self, customer: &mut Customer) {
        match self {
            SettlementTransition::Settled => customer.record_settled(),
            SettlementTransition::Reopened => customer.record_reopened(),
        }
    }
}

impl Invoice {
    /// Re-evaluate the state against the invoice's current paid total.
    ///
    /// Returns the edge crossed, if any. Cancelled invoices never move.
    pub fn settle(&mut self, paid_total: Decimal) -> Option<SettlementTransition> {
        let covered = paid_total >= self.amount;
        match (self.status, covered) {
            (InvoiceStatus::Pending, true) => {
                self.status = InvoiceStatus::Paid;
                Some(SettlementTransition::Settled)
            }
            (InvoiceStatus::Paid, false) => {
                self.status = InvoiceStatus::Pending;
                Some(SettlementTransition::Reopened)
            }
            _ => None,
        }
    }

    /// Manually cancel a Pending invoice.
    pub fn cancel(&mut self) -> BillingResult<()> {
        match self.status {
            InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Cancelled;
                Ok(())
            }
            other => Err(BillingError::invalid_transition(format!(
                "invoice {} cannot be cancelled while {}",
                self.number,
                other.as_str()
            ))),
        }
    }

    /// The counter adjustment owed when this invoice is removed outright.
    pub fn removal_transition(&self) -> Option<SettlementTransition> {
        (self.status == InvoiceStatus::Paid).then_some(SettlementTransition::Reopened)
    }
}
