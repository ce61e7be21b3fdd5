//! Invoicing domain module.
//!
//! Invoices, their settlement state machine, per-category numbering and
//! first-invoice proration, implemented as deterministic domain logic (no IO,
//! no storage).

pub mod invoice;
pub mod numbering;
pub mod proration;
pub mod settlement;

pub use invoice::{Invoice, InvoiceLine, InvoiceStatus, IssueInvoice};
pub use numbering::{NumberingPolicy, format_number, next_number};
pub use proration::{ProrationPolicy, first_invoice_amount};
pub use settlement::SettlementTransition;
