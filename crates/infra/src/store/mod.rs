//! Persistence boundary.
//!
//! Repositories are plain synchronous traits over a transaction handle. Every
//! engine operation runs inside exactly one [`BillingStore::transaction`] (or
//! [`BillingStore::read`]), which is the unit of atomicity and isolation.

use std::sync::Arc;

use cyclebill_catalog::Service;
use cyclebill_core::{
    BillingMonth, BillingResult, CustomerId, InvoiceId, PaymentId, ServiceCategory, ServiceId,
};
use cyclebill_customers::{Customer, Subscription};
use cyclebill_invoicing::Invoice;
use cyclebill_payments::{Payment, PaymentInvoiceLink};

pub mod in_memory;

pub use in_memory::InMemoryBillingStore;

pub trait CustomerRepository {
    fn get_customer(&self, id: CustomerId) -> BillingResult<Option<Customer>>;

    /// Active customers holding at least one active subscription.
    fn list_active_with_active_subscriptions(&self) -> BillingResult<Vec<Customer>>;

    fn subscriptions_for(&self, customer_id: CustomerId) -> BillingResult<Vec<Subscription>>;

    fn save_customer(&mut self, customer: Customer) -> BillingResult<()>;

    fn save_subscription(&mut self, subscription: Subscription) -> BillingResult<()>;
}

pub trait ServiceRepository {
    fn get_service(&self, id: ServiceId) -> BillingResult<Option<Service>>;

    fn save_service(&mut self, service: Service) -> BillingResult<()>;
}

pub trait InvoiceRepository {
    fn get_invoice(&self, id: InvoiceId) -> BillingResult<Option<Invoice>>;

    /// Fails with `DuplicateInvoiceForPeriod` when a non-cancelled invoice
    /// already exists for the same customer, category and month.
    fn insert_invoice(&mut self, invoice: Invoice) -> BillingResult<()>;

    fn update_invoice(&mut self, invoice: Invoice) -> BillingResult<()>;

    /// Fails with `InvoiceHasLinkedPayments` while anything references it.
    fn delete_invoice(&mut self, id: InvoiceId) -> BillingResult<bool>;

    fn invoices_for_customer(&self, customer_id: CustomerId) -> BillingResult<Vec<Invoice>>;

    /// Whether a non-cancelled invoice exists for the period.
    fn exists_for_period(
        &self,
        customer_id: CustomerId,
        category: ServiceCategory,
        month: BillingMonth,
    ) -> BillingResult<bool>;

    /// Every invoice number ever issued, cancelled and deleted invoices included.
    fn invoice_numbers(&self) -> BillingResult<Vec<String>>;
}

pub trait PaymentRepository {
    fn get_payment(&self, id: PaymentId) -> BillingResult<Option<Payment>>;

    fn insert_payment(&mut self, payment: Payment) -> BillingResult<()>;

    /// Remove a payment together with its links.
    fn delete_payment(&mut self, id: PaymentId) -> BillingResult<Option<Payment>>;

    fn insert_link(&mut self, link: PaymentInvoiceLink) -> BillingResult<()>;

    fn links_for_payment(&self, payment_id: PaymentId) -> BillingResult<Vec<PaymentInvoiceLink>>;

    fn links_for_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Vec<PaymentInvoiceLink>>;

    /// Payments attached to the invoice through their direct reference.
    fn direct_payments_for_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Vec<Payment>>;
}

/// Everything a unit of work can touch.
pub trait BillingTx: CustomerRepository + ServiceRepository + InvoiceRepository + PaymentRepository {}

impl<T> BillingTx for T where T: CustomerRepository + ServiceRepository + InvoiceRepository + PaymentRepository {}

/// Transaction boundary.
///
/// `transaction` is exclusive and serializable: the closure's writes commit
/// when it returns `Ok` and are discarded when it returns `Err`. `read` runs
/// concurrently with other readers but never alongside a writer.
pub trait BillingStore: Send + Sync {
    fn transaction<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&mut dyn BillingTx) -> BillingResult<T>;

    fn read<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&dyn BillingTx) -> BillingResult<T>;
}

impl<S> BillingStore for Arc<S>
where
    S: BillingStore,
{
    fn transaction<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&mut dyn BillingTx) -> BillingResult<T>,
    {
        (**self).transaction(work)
    }

    fn read<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&dyn BillingTx) -> BillingResult<T>,
    {
        (**self).read(work)
    }
}
