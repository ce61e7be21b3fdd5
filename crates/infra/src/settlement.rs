//! Drives the invoice settlement state machine against the store.
//!
//! Every status change and its paid-invoice counter adjustment happen in the
//! same transaction, so the counter always equals the number of edges crossed.

use rust_decimal::Decimal;
use tracing::debug;

use cyclebill_core::{BillingError, BillingResult, CustomerId, InvoiceId};
use cyclebill_invoicing::{Invoice, SettlementTransition};

use crate::store::{BillingTx, CustomerRepository, InvoiceRepository, PaymentRepository};

/// Direct payment totals plus applied link amounts.
pub fn paid_total(tx: &dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Decimal> {
    let direct: Decimal = tx
        .direct_payments_for_invoice(invoice_id)?
        .iter()
        .map(|p| p.total())
        .sum();
    let linked: Decimal = tx
        .links_for_invoice(invoice_id)?
        .iter()
        .map(|l| l.applied_amount)
        .sum();
    Ok(direct + linked)
}

pub fn load_invoice(tx: &dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Invoice> {
    tx.get_invoice(invoice_id)?
        .ok_or(BillingError::InvoiceNotFound(invoice_id))
}

/// Amount still owed on an invoice. Never negative.
pub fn outstanding_balance(tx: &dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Decimal> {
    let invoice = load_invoice(tx, invoice_id)?;
    Ok(invoice.outstanding(paid_total(tx, invoice_id)?))
}

/// Re-evaluate an invoice against its current paid total and persist any edge.
pub fn resettle(tx: &mut dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Option<SettlementTransition>> {
    let mut invoice = load_invoice(&*tx, invoice_id)?;
    let paid = paid_total(&*tx, invoice_id)?;
    let Some(edge) = invoice.settle(paid) else {
        return Ok(None);
    };

    let customer_id = invoice.customer_id();
    debug!(invoice = %invoice.number(), ?edge, %paid, amount = %invoice.amount(), "invoice settlement changed");
    tx.update_invoice(invoice)?;
    apply_to_customer(tx, customer_id, edge)?;
    Ok(Some(edge))
}

pub fn cancel_invoice(tx: &mut dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Invoice> {
    let mut invoice = load_invoice(&*tx, invoice_id)?;
    invoice.cancel()?;
    tx.update_invoice(invoice.clone())?;
    Ok(invoice)
}

/// Remove an invoice nothing pays. A Paid invoice gives its counter increment back.
pub fn delete_invoice(tx: &mut dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<()> {
    let invoice = load_invoice(&*tx, invoice_id)?;
    if !tx.links_for_invoice(invoice_id)?.is_empty() || !tx.direct_payments_for_invoice(invoice_id)?.is_empty() {
        return Err(BillingError::InvoiceHasLinkedPayments(invoice_id));
    }

    tx.delete_invoice(invoice_id)?;
    if let Some(edge) = invoice.removal_transition() {
        apply_to_customer(tx, invoice.customer_id(), edge)?;
    }
    Ok(())
}

fn apply_to_customer(tx: &mut dyn BillingTx, customer_id: CustomerId, edge: SettlementTransition) -> BillingResult<()> {
    let mut customer = tx
        .get_customer(customer_id)?
        .ok_or(BillingError::CustomerNotFound(customer_id))?;
    edge.apply_to(&mut customer);
    tx.save_customer(customer)
}
