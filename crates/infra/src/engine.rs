//! The billing engine facade.
//!
//! Each call is one unit of work: it opens a single store transaction, runs
//! the component logic inside it and commits only on success.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use cyclebill_core::{BillingMonth, BillingResult, CustomerId, InvoiceId, PaymentId, ServiceId};
use cyclebill_invoicing::Invoice;
use cyclebill_payments::{NewPayment, Tender};

use crate::allocation::{PaymentAllocator, RecordedPayment};
use crate::clock::{Clock, SystemClock};
use crate::config::BillingConfig;
use crate::generation::{GenerationReport, InvoiceGenerator};
use crate::rates::{ConfiguredRate, ExchangeRateProvider};
use crate::recurring::{RecurringBillingRun, RecurringRunReport};
use crate::settlement;
use crate::store::BillingStore;

pub struct BillingEngine<S> {
    store: S,
    config: BillingConfig,
    clock: Arc<dyn Clock>,
    rates: Arc<dyn ExchangeRateProvider>,
}

impl<S> BillingEngine<S>
where
    S: BillingStore,
{
    /// Engine on the system clock with the configured default exchange rate.
    pub fn new(store: S, config: BillingConfig) -> BillingResult<Self> {
        config.validate()?;
        let rates = ConfiguredRate::new(config.default_exchange_rate)?;
        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            rates: Arc::new(rates),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rates(mut self, rates: Arc<dyn ExchangeRateProvider>) -> Self {
        self.rates = rates;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    fn allocator(&self) -> PaymentAllocator<'_> {
        PaymentAllocator::new(&self.config, self.clock.as_ref(), self.rates.as_ref())
    }

    /// Manually bill `service_ids` for one customer and month.
    #[instrument(skip(self, service_ids), fields(customer_id = %customer_id, month = %billing_month), err)]
    pub fn generate_invoice(
        &self,
        customer_id: CustomerId,
        service_ids: &[ServiceId],
        billing_month: BillingMonth,
    ) -> BillingResult<GenerationReport> {
        let generator = InvoiceGenerator::new(&self.config, self.clock.as_ref());
        self.store
            .transaction(|tx| generator.generate_for_customer(tx, customer_id, service_ids, billing_month))
    }

    /// Bill the previous month for everyone. Returns the number of invoices created.
    #[instrument(skip(self), err)]
    pub fn run_recurring_billing(&self) -> BillingResult<usize> {
        RecurringBillingRun::new(&self.store, &self.config, self.clock.as_ref()).run()
    }

    #[instrument(skip(self), err)]
    pub fn run_recurring_billing_report(&self) -> BillingResult<RecurringRunReport> {
        RecurringBillingRun::new(&self.store, &self.config, self.clock.as_ref()).run_with_report()
    }

    #[instrument(skip(self, payment), fields(channel = ?payment.tender.channel), err)]
    pub fn create_payment(
        &self,
        payment: NewPayment,
        invoice_ids: Option<&[InvoiceId]>,
        applied_amounts: Option<&[Decimal]>,
    ) -> BillingResult<RecordedPayment> {
        let allocator = self.allocator();
        self.store
            .transaction(|tx| allocator.create(tx, payment, invoice_ids, applied_amounts))
    }

    #[instrument(skip(self), err)]
    pub fn delete_payment(&self, payment_id: PaymentId) -> BillingResult<bool> {
        let allocator = self.allocator();
        self.store.transaction(|tx| allocator.delete(tx, payment_id))
    }

    /// Delete several payments in one transaction. Returns `(deleted, not_found)`.
    #[instrument(skip(self, payment_ids), fields(count = payment_ids.len()), err)]
    pub fn delete_payments(&self, payment_ids: &[PaymentId]) -> BillingResult<(usize, usize)> {
        let allocator = self.allocator();
        self.store.transaction(|tx| allocator.delete_many(tx, payment_ids))
    }

    pub fn get_outstanding_balance(&self, invoice_id: InvoiceId) -> BillingResult<Decimal> {
        self.store.read(|tx| settlement::outstanding_balance(tx, invoice_id))
    }

    pub fn compute_payment_total(&self, tender: &Tender) -> BillingResult<Decimal> {
        self.allocator().compute_total(tender)
    }

    #[instrument(skip(self), err)]
    pub fn cancel_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Invoice> {
        self.store.transaction(|tx| settlement::cancel_invoice(tx, invoice_id))
    }

    #[instrument(skip(self), err)]
    pub fn delete_invoice(&self, invoice_id: InvoiceId) -> BillingResult<()> {
        self.store.transaction(|tx| settlement::delete_invoice(tx, invoice_id))
    }
}
