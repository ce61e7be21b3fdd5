//! `cyclebill-core`: shared billing building blocks.
//!
//! Identifiers, the error model, value objects and the money policy. No
//! storage or IO concerns live here.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::{Entity, index_by_id};
pub use error::{BillingError, BillingResult};
pub use id::{CustomerId, InvoiceId, PaymentId, ServiceId, SubscriptionId};
pub use money::{AllocationTolerance, AmountReviewThresholds, MONEY_SCALE, MoneyRounding};
pub use value_object::{BillingMonth, ServiceCategory, ValueObject};
