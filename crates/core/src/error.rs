//! Billing error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{CustomerId, InvoiceId, PaymentId, ServiceId};
use crate::value_object::{BillingMonth, ServiceCategory};

/// Result type used across the billing crates.
pub type BillingResult<T> = Result<T, BillingError>;

/// Billing-level error.
///
/// Every failure is scoped to a single invoice or payment operation; none of
/// these are fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("service {0} not found or inactive")]
    ServiceNotFoundOrInactive(ServiceId),

    /// A non-cancelled invoice already exists for the period.
    #[error("customer {customer_id} already has a {category} invoice for {month}")]
    DuplicateInvoiceForPeriod {
        customer_id: CustomerId,
        category: ServiceCategory,
        month: BillingMonth,
    },

    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),

    /// The selected invoices belong to more than one customer.
    #[error("selected invoices belong to different customers")]
    CrossCustomerInvoiceMix,

    /// All selected invoices are already fully paid.
    #[error("selected invoices have no outstanding balance")]
    NoOutstandingBalance,

    /// The applied amounts exceed the payment total beyond tolerance.
    #[error("applied amounts {applied} exceed the allowed {limit}")]
    OverAllocation { applied: Decimal, limit: Decimal },

    #[error("invoice {0} has linked payments")]
    InvoiceHasLinkedPayments(InvoiceId),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A value failed validation (malformed input, bad configuration).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store failed (lock poisoned, connection lost, ...).
    #[error("store failure: {0}")]
    Store(String),
}

impl BillingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the error is the expected "already billed" outcome.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateInvoiceForPeriod { .. })
    }
}
