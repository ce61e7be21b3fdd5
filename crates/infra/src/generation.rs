//! Invoice generation shared by the manual and batch paths.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use cyclebill_catalog::Service;
use cyclebill_core::{BillingError, BillingMonth, BillingResult, CustomerId, InvoiceId, ServiceCategory, ServiceId};
use cyclebill_customers::{Customer, billable_subscriptions};
use cyclebill_invoicing::{Invoice, InvoiceLine, IssueInvoice, format_number, next_number};

use crate::clock::Clock;
use crate::config::BillingConfig;
use crate::store::{BillingTx, CustomerRepository, InvoiceRepository, ServiceRepository};

/// Who asked for the invoices. Decides how per-category failures are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// An operator generating for one customer: every skip is surfaced.
    Manual,
    /// The recurring run: duplicates are expected and only counted.
    Batch,
}

/// A category that produced no invoice, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCategory {
    pub category: ServiceCategory,
    pub reason: BillingError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub invoices: Vec<Invoice>,
    pub skipped: Vec<SkippedCategory>,
}

impl GenerationReport {
    pub fn duplicates(&self) -> usize {
        self.skipped.iter().filter(|s| s.reason.is_duplicate()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SkippedCategory> {
        self.skipped.iter().filter(|s| !s.reason.is_duplicate())
    }
}

/// A service to bill and how many units of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillableItem {
    pub service: Service,
    pub quantity: u32,
}

pub struct InvoiceGenerator<'a> {
    config: &'a BillingConfig,
    clock: &'a dyn Clock,
}

impl<'a> InvoiceGenerator<'a> {
    pub fn new(config: &'a BillingConfig, clock: &'a dyn Clock) -> Self {
        Self { config, clock }
    }

    /// Manual path: bill the given services for one customer and month.
    ///
    /// Fails when nothing was created, with the first per-category error.
    pub fn generate_for_customer(
        &self,
        tx: &mut dyn BillingTx,
        customer_id: CustomerId,
        service_ids: &[ServiceId],
        month: BillingMonth,
    ) -> BillingResult<GenerationReport> {
        let customer = tx
            .get_customer(customer_id)?
            .ok_or(BillingError::CustomerNotFound(customer_id))?;
        if service_ids.is_empty() {
            return Err(BillingError::validation("at least one service is required"));
        }

        let subscriptions = tx.subscriptions_for(customer_id)?;
        let quantities: BTreeMap<ServiceId, u32> = billable_subscriptions(&subscriptions)
            .into_iter()
            .map(|s| (s.service_id(), s.quantity()))
            .collect();

        let requested: BTreeSet<ServiceId> = service_ids.iter().copied().collect();
        let mut items = Vec::with_capacity(requested.len());
        for service_id in requested {
            let service = tx
                .get_service(service_id)?
                .filter(Service::is_active)
                .ok_or(BillingError::ServiceNotFoundOrInactive(service_id))?;
            items.push(BillableItem {
                service,
                quantity: quantities.get(&service_id).copied().unwrap_or(1),
            });
        }

        let report = self.generate(tx, &customer, items, month, GenerationMode::Manual)?;
        if report.invoices.is_empty() {
            return Err(report
                .skipped
                .into_iter()
                .next()
                .map(|s| s.reason)
                .unwrap_or_else(|| BillingError::validation("no invoice was generated")));
        }
        Ok(report)
    }

    /// Bill `items` for one customer, one invoice per category.
    ///
    /// A failing category never blocks the others. Only store-level errors
    /// abort the call.
    pub fn generate(
        &self,
        tx: &mut dyn BillingTx,
        customer: &Customer,
        items: Vec<BillableItem>,
        month: BillingMonth,
        mode: GenerationMode,
    ) -> BillingResult<GenerationReport> {
        let first_invoice = tx.invoices_for_customer(customer.id_typed())?.is_empty();

        let mut by_category: BTreeMap<ServiceCategory, Vec<BillableItem>> = BTreeMap::new();
        for item in items {
            by_category.entry(item.service.category()).or_default().push(item);
        }

        let mut report = GenerationReport::default();
        for (category, items) in by_category {
            match self.issue(tx, customer, category, &items, month, first_invoice) {
                Ok(invoice) => {
                    debug!(customer = %customer.id_typed(), number = %invoice.number(), amount = %invoice.amount(), "invoice issued");
                    report.invoices.push(invoice);
                }
                Err(err @ BillingError::Store(_)) => return Err(err),
                Err(reason) => {
                    match (mode, reason.is_duplicate()) {
                        (GenerationMode::Batch, true) => {
                            debug!(customer = %customer.id_typed(), %category, %month, "already billed, skipping")
                        }
                        (GenerationMode::Manual, true) => {
                            info!(customer = %customer.id_typed(), %category, %month, "invoice already exists for period")
                        }
                        (_, false) => {
                            warn!(customer = %customer.id_typed(), %category, %month, error = %reason, "invoice generation failed")
                        }
                    }
                    report.skipped.push(SkippedCategory { category, reason });
                }
            }
        }
        Ok(report)
    }

    fn issue(
        &self,
        tx: &mut dyn BillingTx,
        customer: &Customer,
        category: ServiceCategory,
        items: &[BillableItem],
        month: BillingMonth,
        first_invoice: bool,
    ) -> BillingResult<Invoice> {
        if tx.exists_for_period(customer.id_typed(), category, month)? {
            return Err(BillingError::DuplicateInvoiceForPeriod {
                customer_id: customer.id_typed(),
                category,
                month,
            });
        }

        let enrollment = first_invoice.then(|| customer.enrolled_on());
        let lines: Vec<InvoiceLine> = items
            .iter()
            .map(|item| InvoiceLine::priced(&item.service, item.quantity, month, enrollment, &self.config.proration))
            .collect::<BillingResult<_>>()?;

        let numbers = tx.invoice_numbers()?;
        let sequence = next_number(numbers.iter().map(String::as_str), category, &self.config.numbering)?;
        let number = format_number(sequence, customer.name(), month, category, &self.config.numbering);

        let invoice = Invoice::issue(
            IssueInvoice {
                invoice_id: InvoiceId::new(),
                number,
                customer_id: customer.id_typed(),
                category,
                billing_month: month,
                lines,
                issued_at: self.clock.now(),
            },
            self.config.rounding,
        )?;
        tx.insert_invoice(invoice.clone())?;
        Ok(invoice)
    }
}
