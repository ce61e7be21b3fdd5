//! Recording and reversing payments.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use cyclebill_core::{BillingError, BillingResult, CustomerId, InvoiceId, PaymentId};
use cyclebill_invoicing::{Invoice, InvoiceStatus};
use cyclebill_payments::{
    AmountReview, NewPayment, Payment, PaymentInvoiceLink, RecordPayment, Tender, derive_applied_amounts,
    review_amount, validate_applied_amounts,
};

use crate::clock::Clock;
use crate::config::BillingConfig;
use crate::rates::ExchangeRateProvider;
use crate::settlement::{load_invoice, paid_total, resettle};
use crate::store::{BillingTx, PaymentRepository};

/// A stored payment with the links it created and how its amount compared
/// with the balance it was meant to cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub links: Vec<PaymentInvoiceLink>,
    pub review: AmountReview,
}

pub struct PaymentAllocator<'a> {
    config: &'a BillingConfig,
    clock: &'a dyn Clock,
    rates: &'a dyn ExchangeRateProvider,
}

impl<'a> PaymentAllocator<'a> {
    pub fn new(config: &'a BillingConfig, clock: &'a dyn Clock, rates: &'a dyn ExchangeRateProvider) -> Self {
        Self { config, clock, rates }
    }

    /// Local-currency total of a tender.
    pub fn compute_total(&self, tender: &Tender) -> BillingResult<Decimal> {
        tender.total(self.rates.default_rate()?, self.config.rounding)
    }

    /// Record a payment against one invoice (direct reference) or several
    /// (`invoice_ids`, optionally with explicit `applied_amounts`).
    ///
    /// An empty `invoice_ids` counts as absent.
    pub fn create(
        &self,
        tx: &mut dyn BillingTx,
        payment: NewPayment,
        invoice_ids: Option<&[InvoiceId]>,
        applied_amounts: Option<&[Decimal]>,
    ) -> BillingResult<RecordedPayment> {
        match (invoice_ids.filter(|ids| !ids.is_empty()), payment.invoice_id) {
            (Some(ids), _) => self.create_for_invoices(tx, payment, ids, applied_amounts),
            (None, Some(invoice_id)) => self.create_for_invoice(tx, payment, invoice_id),
            (None, None) => Err(BillingError::validation(
                "payment must reference an invoice or a list of invoices",
            )),
        }
    }

    fn create_for_invoice(
        &self,
        tx: &mut dyn BillingTx,
        payment: NewPayment,
        invoice_id: InvoiceId,
    ) -> BillingResult<RecordedPayment> {
        let invoice = payable_invoice(&*tx, invoice_id)?;
        let outstanding = invoice.outstanding(paid_total(&*tx, invoice_id)?);

        let payment = self.record(invoice.customer_id(), payment)?;
        let review = self.review(&payment, outstanding);
        tx.insert_payment(payment.clone())?;
        resettle(tx, invoice_id)?;

        Ok(RecordedPayment {
            payment,
            links: Vec::new(),
            review,
        })
    }

    fn create_for_invoices(
        &self,
        tx: &mut dyn BillingTx,
        mut payment: NewPayment,
        invoice_ids: &[InvoiceId],
        applied_amounts: Option<&[Decimal]>,
    ) -> BillingResult<RecordedPayment> {
        let distinct: BTreeSet<InvoiceId> = invoice_ids.iter().copied().collect();
        if distinct.len() != invoice_ids.len() {
            return Err(BillingError::validation("invoice list contains duplicates"));
        }

        let invoices = invoice_ids
            .iter()
            .map(|id| payable_invoice(&*tx, *id))
            .collect::<BillingResult<Vec<Invoice>>>()?;
        let customer_id = single_customer(&invoices)?;

        let mut balances = Vec::with_capacity(invoices.len());
        for invoice in &invoices {
            balances.push(invoice.amount() - paid_total(&*tx, invoice.id_typed())?);
        }

        // Links carry the attribution; a direct reference would count twice.
        payment.invoice_id = None;
        let payment = self.record(customer_id, payment)?;

        let applied = match applied_amounts {
            Some(explicit) if explicit.len() == invoices.len() => explicit.to_vec(),
            _ => derive_applied_amounts(payment.total(), &balances)?,
        };
        validate_applied_amounts(&applied, payment.total(), &self.config.allocation_tolerance)?;

        let outstanding: Decimal = balances.iter().map(|b| (*b).max(Decimal::ZERO)).sum();
        let review = self.review(&payment, outstanding);

        tx.insert_payment(payment.clone())?;
        let mut links = Vec::with_capacity(invoices.len());
        for (invoice, applied_amount) in invoices.iter().zip(applied) {
            let link = PaymentInvoiceLink {
                payment_id: payment.id_typed(),
                invoice_id: invoice.id_typed(),
                applied_amount,
            };
            tx.insert_link(link)?;
            links.push(link);
        }
        for invoice in &invoices {
            resettle(tx, invoice.id_typed())?;
        }

        Ok(RecordedPayment { payment, links, review })
    }

    /// Remove a payment and re-settle every invoice it touched.
    ///
    /// Returns `false` when the payment does not exist.
    pub fn delete(&self, tx: &mut dyn BillingTx, payment_id: PaymentId) -> BillingResult<bool> {
        let links = tx.links_for_payment(payment_id)?;
        let Some(payment) = tx.delete_payment(payment_id)? else {
            return Ok(false);
        };

        let touched: BTreeSet<InvoiceId> = payment
            .invoice_id()
            .into_iter()
            .chain(links.iter().map(|l| l.invoice_id))
            .collect();
        for invoice_id in touched {
            resettle(tx, invoice_id)?;
        }
        debug!(payment = %payment_id, total = %payment.total(), "payment deleted");
        Ok(true)
    }

    /// Returns `(deleted, not_found)`.
    pub fn delete_many(&self, tx: &mut dyn BillingTx, payment_ids: &[PaymentId]) -> BillingResult<(usize, usize)> {
        let mut deleted = 0;
        let mut not_found = 0;
        for payment_id in payment_ids {
            if self.delete(tx, *payment_id)? {
                deleted += 1;
            } else {
                not_found += 1;
            }
        }
        Ok((deleted, not_found))
    }

    fn record(&self, customer_id: CustomerId, payment: NewPayment) -> BillingResult<Payment> {
        Payment::record(
            RecordPayment {
                payment_id: PaymentId::new(),
                customer_id,
                payment,
                default_rate: self.rates.default_rate()?,
                recorded_at: self.clock.now(),
            },
            self.config.rounding,
        )
    }

    fn review(&self, payment: &Payment, outstanding: Decimal) -> AmountReview {
        let review = review_amount(payment.total(), outstanding, &self.config.amount_review);
        if review.is_unusual() {
            warn!(
                customer = %payment.customer_id(),
                total = %payment.total(),
                %outstanding,
                ?review,
                "payment amount is unusual for the outstanding balance"
            );
        }
        review
    }
}

fn payable_invoice(tx: &dyn BillingTx, invoice_id: InvoiceId) -> BillingResult<Invoice> {
    let invoice = load_invoice(tx, invoice_id)?;
    if invoice.status() == InvoiceStatus::Cancelled {
        return Err(BillingError::validation(format!(
            "invoice {} is cancelled and cannot receive payments",
            invoice.number()
        )));
    }
    Ok(invoice)
}

fn single_customer(invoices: &[Invoice]) -> BillingResult<CustomerId> {
    let mut customers = invoices.iter().map(Invoice::customer_id);
    let first = customers
        .next()
        .ok_or_else(|| BillingError::validation("invoice list must not be empty"))?;
    if customers.any(|c| c != first) {
        return Err(BillingError::CrossCustomerInvoiceMix);
    }
    Ok(first)
}
