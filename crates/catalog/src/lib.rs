//! Service catalog: what can be subscribed to and billed.

pub mod service;

pub use service::Service;
