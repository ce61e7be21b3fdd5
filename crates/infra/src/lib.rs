//! Infrastructure layer: storage boundary, config, time and rate sources,
//! and the orchestration that ties the billing domain crates together.

pub mod allocation;
pub mod clock;
pub mod config;
pub mod engine;
pub mod generation;
pub mod rates;
pub mod recurring;
pub mod settlement;
pub mod store;

mod integration_tests;

pub use allocation::{PaymentAllocator, RecordedPayment};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BillingConfig;
pub use engine::BillingEngine;
pub use generation::{BillableItem, GenerationMode, GenerationReport, InvoiceGenerator, SkippedCategory};
pub use rates::{ConfiguredRate, ExchangeRateProvider};
pub use recurring::{RecurringBillingRun, RecurringRunReport, RunFailure};
pub use store::{
    BillingStore, BillingTx, CustomerRepository, InMemoryBillingStore, InvoiceRepository, PaymentRepository,
    ServiceRepository,
};
