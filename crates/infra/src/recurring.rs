//! The monthly batch run.
//!
//! Bills every active customer for the month before "today". Running it twice
//! for the same month is a no-op the second time: existing invoices are
//! skipped as duplicates.

use tracing::{debug, info, warn};

use cyclebill_core::{BillingError, BillingMonth, BillingResult, CustomerId, ServiceCategory};
use cyclebill_customers::{Customer, billable_subscriptions};

use crate::clock::Clock;
use crate::config::BillingConfig;
use crate::generation::{BillableItem, GenerationMode, InvoiceGenerator};
use crate::store::{BillingStore, BillingTx, CustomerRepository, ServiceRepository};

/// A customer (and category, when known) the run had to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub customer_id: CustomerId,
    pub category: Option<ServiceCategory>,
    pub error: BillingError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringRunReport {
    pub billing_month: BillingMonth,
    pub customers_considered: usize,
    pub invoices_created: usize,
    pub duplicates_skipped: usize,
    pub failures: Vec<RunFailure>,
}

impl RecurringRunReport {
    fn new(billing_month: BillingMonth) -> Self {
        Self {
            billing_month,
            customers_considered: 0,
            invoices_created: 0,
            duplicates_skipped: 0,
            failures: Vec::new(),
        }
    }
}

pub struct RecurringBillingRun<'a, S> {
    store: &'a S,
    config: &'a BillingConfig,
    clock: &'a dyn Clock,
}

impl<'a, S> RecurringBillingRun<'a, S>
where
    S: BillingStore,
{
    pub fn new(store: &'a S, config: &'a BillingConfig, clock: &'a dyn Clock) -> Self {
        Self { store, config, clock }
    }

    /// Number of invoices created.
    pub fn run(&self) -> BillingResult<usize> {
        Ok(self.run_with_report()?.invoices_created)
    }

    pub fn run_with_report(&self) -> BillingResult<RecurringRunReport> {
        let month = BillingMonth::preceding(self.clock.today());
        let generator = InvoiceGenerator::new(self.config, self.clock);

        let report = self.store.transaction(|tx| {
            let mut report = RecurringRunReport::new(month);
            for customer in tx.list_active_with_active_subscriptions()? {
                report.customers_considered += 1;
                let items = match billable_items(&*tx, &customer) {
                    Ok(items) => items,
                    Err(err @ BillingError::Store(_)) => return Err(err),
                    Err(error) => {
                        warn!(customer = %customer.id_typed(), %error, "could not collect billable services");
                        report.failures.push(RunFailure {
                            customer_id: customer.id_typed(),
                            category: None,
                            error,
                        });
                        continue;
                    }
                };
                if items.is_empty() {
                    debug!(customer = %customer.id_typed(), "nothing billable");
                    continue;
                }

                let generated = generator.generate(tx, &customer, items, month, GenerationMode::Batch)?;
                report.invoices_created += generated.invoices.len();
                report.duplicates_skipped += generated.duplicates();
                report.failures.extend(generated.failures().map(|s| RunFailure {
                    customer_id: customer.id_typed(),
                    category: Some(s.category),
                    error: s.reason.clone(),
                }));
            }
            Ok(report)
        })?;

        info!(
            month = %report.billing_month,
            customers = report.customers_considered,
            created = report.invoices_created,
            duplicates = report.duplicates_skipped,
            failures = report.failures.len(),
            "recurring billing run finished"
        );
        Ok(report)
    }
}

/// One item per distinct active subscription whose service is still active.
fn billable_items(tx: &dyn BillingTx, customer: &Customer) -> BillingResult<Vec<BillableItem>> {
    let subscriptions = tx.subscriptions_for(customer.id_typed())?;
    let mut items = Vec::new();
    for subscription in billable_subscriptions(&subscriptions) {
        match tx.get_service(subscription.service_id())? {
            Some(service) if service.is_active() => items.push(BillableItem {
                service,
                quantity: subscription.quantity(),
            }),
            _ => debug!(
                customer = %customer.id_typed(),
                service = %subscription.service_id(),
                "subscribed service missing or inactive"
            ),
        }
    }
    Ok(items)
}
