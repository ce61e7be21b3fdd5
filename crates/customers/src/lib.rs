//! Customers and their service subscriptions.

pub mod customer;
pub mod subscription;

pub use customer::Customer;
pub use subscription::{Subscription, billable_subscriptions};
