use std::collections::BTreeMap;
use std::sync::RwLock;

use cyclebill_catalog::Service;
use cyclebill_core::{
    BillingError, BillingMonth, BillingResult, CustomerId, Entity, InvoiceId, PaymentId, ServiceCategory,
    ServiceId, SubscriptionId, index_by_id,
};
use cyclebill_customers::{Customer, Subscription};
use cyclebill_invoicing::Invoice;
use cyclebill_payments::{Payment, PaymentInvoiceLink};

use super::{
    BillingStore, BillingTx, CustomerRepository, InvoiceRepository, PaymentRepository, ServiceRepository,
};

/// Whole-store snapshot. A transaction works on a copy and swaps it in on commit.
#[derive(Debug, Clone, Default)]
struct Tables {
    customers: BTreeMap<CustomerId, Customer>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    services: BTreeMap<ServiceId, Service>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    payments: BTreeMap<PaymentId, Payment>,
    links: Vec<PaymentInvoiceLink>,
    /// Numbers of deleted invoices. They keep the sequences from going back.
    retired_numbers: Vec<String>,
}

/// In-memory transactional store for tests/dev.
///
/// Writers are serialized by a single lock, so scan-then-insert sequences
/// (invoice numbering, the recurring run) never interleave. Each transaction
/// copies the tables, which is fine at test scale and nowhere else.
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    tables: RwLock<Tables>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with reference data.
    pub fn seeded<C, V, S>(customers: C, services: V, subscriptions: S) -> Self
    where
        C: IntoIterator<Item = Customer>,
        V: IntoIterator<Item = Service>,
        S: IntoIterator<Item = Subscription>,
    {
        Self {
            tables: RwLock::new(Tables {
                customers: index_by_id(customers),
                services: index_by_id(services),
                subscriptions: index_by_id(subscriptions),
                ..Tables::default()
            }),
        }
    }
}

fn poisoned() -> BillingError {
    BillingError::store("billing store lock poisoned")
}

impl BillingStore for InMemoryBillingStore {
    fn transaction<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&mut dyn BillingTx) -> BillingResult<T>,
    {
        let mut committed = self.tables.write().map_err(|_| poisoned())?;
        let mut working = committed.clone();
        let out = work(&mut working)?;
        *committed = working;
        Ok(out)
    }

    fn read<T, F>(&self, work: F) -> BillingResult<T>
    where
        F: FnOnce(&dyn BillingTx) -> BillingResult<T>,
    {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        work(&*tables)
    }
}

impl CustomerRepository for Tables {
    fn get_customer(&self, id: CustomerId) -> BillingResult<Option<Customer>> {
        Ok(self.customers.get(&id).cloned())
    }

    fn list_active_with_active_subscriptions(&self) -> BillingResult<Vec<Customer>> {
        Ok(self
            .customers
            .values()
            .filter(|c| c.is_active())
            .filter(|c| {
                self.subscriptions
                    .values()
                    .any(|s| s.is_active() && s.customer_id() == c.id_typed())
            })
            .cloned()
            .collect())
    }

    fn subscriptions_for(&self, customer_id: CustomerId) -> BillingResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .values()
            .filter(|s| s.customer_id() == customer_id)
            .cloned()
            .collect())
    }

    fn save_customer(&mut self, customer: Customer) -> BillingResult<()> {
        self.customers.insert(*customer.id(), customer);
        Ok(())
    }

    fn save_subscription(&mut self, subscription: Subscription) -> BillingResult<()> {
        if !self.customers.contains_key(&subscription.customer_id()) {
            return Err(BillingError::CustomerNotFound(subscription.customer_id()));
        }
        self.subscriptions.insert(*subscription.id(), subscription);
        Ok(())
    }
}

impl ServiceRepository for Tables {
    fn get_service(&self, id: ServiceId) -> BillingResult<Option<Service>> {
        Ok(self.services.get(&id).cloned())
    }

    fn save_service(&mut self, service: Service) -> BillingResult<()> {
        self.services.insert(*service.id(), service);
        Ok(())
    }
}

impl InvoiceRepository for Tables {
    fn get_invoice(&self, id: InvoiceId) -> BillingResult<Option<Invoice>> {
        Ok(self.invoices.get(&id).cloned())
    }

    fn insert_invoice(&mut self, invoice: Invoice) -> BillingResult<()> {
        let (customer_id, category, month) = (invoice.customer_id(), invoice.category(), invoice.billing_month());
        if invoice.counts_for_period() && self.exists_for_period(customer_id, category, month)? {
            return Err(BillingError::DuplicateInvoiceForPeriod {
                customer_id,
                category,
                month,
            });
        }
        if self.invoices.contains_key(invoice.id()) {
            return Err(BillingError::store(format!("invoice {} already stored", invoice.id())));
        }
        self.invoices.insert(*invoice.id(), invoice);
        Ok(())
    }

    fn update_invoice(&mut self, invoice: Invoice) -> BillingResult<()> {
        match self.invoices.get_mut(invoice.id()) {
            Some(stored) => {
                *stored = invoice;
                Ok(())
            }
            None => Err(BillingError::InvoiceNotFound(*invoice.id())),
        }
    }

    fn delete_invoice(&mut self, id: InvoiceId) -> BillingResult<bool> {
        let referenced = self.links.iter().any(|l| l.invoice_id == id)
            || self.payments.values().any(|p| p.invoice_id() == Some(id));
        if referenced {
            return Err(BillingError::InvoiceHasLinkedPayments(id));
        }
        match self.invoices.remove(&id) {
            Some(invoice) => {
                self.retired_numbers.push(invoice.number().to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn invoices_for_customer(&self, customer_id: CustomerId) -> BillingResult<Vec<Invoice>> {
        Ok(self
            .invoices
            .values()
            .filter(|i| i.customer_id() == customer_id)
            .cloned()
            .collect())
    }

    fn exists_for_period(
        &self,
        customer_id: CustomerId,
        category: ServiceCategory,
        month: BillingMonth,
    ) -> BillingResult<bool> {
        Ok(self
            .invoices
            .values()
            .any(|i| i.counts_for_period() && i.is_for_period(customer_id, category, month)))
    }

    fn invoice_numbers(&self) -> BillingResult<Vec<String>> {
        Ok(self
            .invoices
            .values()
            .map(|i| i.number().to_string())
            .chain(self.retired_numbers.iter().cloned())
            .collect())
    }
}

impl PaymentRepository for Tables {
    fn get_payment(&self, id: PaymentId) -> BillingResult<Option<Payment>> {
        Ok(self.payments.get(&id).cloned())
    }

    fn insert_payment(&mut self, payment: Payment) -> BillingResult<()> {
        if let Some(invoice_id) = payment.invoice_id() {
            if !self.invoices.contains_key(&invoice_id) {
                return Err(BillingError::InvoiceNotFound(invoice_id));
            }
        }
        if self.payments.contains_key(payment.id()) {
            return Err(BillingError::store(format!("payment {} already stored", payment.id())));
        }
        self.payments.insert(*payment.id(), payment);
        Ok(())
    }

    fn delete_payment(&mut self, id: PaymentId) -> BillingResult<Option<Payment>> {
        let removed = self.payments.remove(&id);
        if removed.is_some() {
            self.links.retain(|l| l.payment_id != id);
        }
        Ok(removed)
    }

    fn insert_link(&mut self, link: PaymentInvoiceLink) -> BillingResult<()> {
        if !self.payments.contains_key(&link.payment_id) {
            return Err(BillingError::PaymentNotFound(link.payment_id));
        }
        if !self.invoices.contains_key(&link.invoice_id) {
            return Err(BillingError::InvoiceNotFound(link.invoice_id));
        }
        self.links.push(link);
        Ok(())
    }

    fn links_for_payment(&self, payment_id: PaymentId) -> BillingResult<Vec<PaymentInvoiceLink>> {
        Ok(self.links.iter().filter(|l| l.payment_id == payment_id).copied().collect())
    }

    fn links_for_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Vec<PaymentInvoiceLink>> {
        Ok(self.links.iter().filter(|l| l.invoice_id == invoice_id).copied().collect())
    }

    fn direct_payments_for_invoice(&self, invoice_id: InvoiceId) -> BillingResult<Vec<Payment>> {
        Ok(self
            .payments
            .values()
            .filter(|p| p.invoice_id() == Some(invoice_id))
            .cloned()
            .collect())
    }
}
