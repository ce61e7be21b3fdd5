//! Payments domain module.
//!
//! Multi-currency, multi-channel payment totals and the arithmetic for
//! spreading one payment over several invoices. Pure logic; persistence and
//! settlement orchestration live in `cyclebill-infra`.

pub mod allocation;
pub mod payment;

pub use allocation::{
    AmountReview, PaymentInvoiceLink, derive_applied_amounts, review_amount, validate_applied_amounts,
};
pub use payment::{
    Currency, LegacyAmount, NewPayment, Payment, PaymentChannel, PaymentLeg, RecordPayment, Tender,
    change_due,
};
