use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cyclebill_catalog::Service;
use cyclebill_core::{
    BillingError, BillingMonth, BillingResult, CustomerId, Entity, InvoiceId, MoneyRounding,
    ServiceCategory, ServiceId,
};

use crate::proration::{ProrationPolicy, first_invoice_amount};

/// Invoice settlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// One billed service on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub service_id: ServiceId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub amount: Decimal,
    /// Whether `amount` is a prorated first-month charge.
    pub prorated: bool,
}

impl InvoiceLine {
    /// Price one service for a billing month.
    ///
    /// `first_invoice_enrollment` is the customer's enrollment date when this is
    /// the customer's very first invoice; it only matters for prorated categories.
    /// Per-unit categories bill `unit_price × quantity`; prorated categories bill
    /// a single unit.
    pub fn priced(
        service: &Service,
        quantity: u32,
        month: BillingMonth,
        first_invoice_enrollment: Option<NaiveDate>,
        policy: &ProrationPolicy,
    ) -> BillingResult<Self> {
        let unit_price = service.unit_price();
        if !service.category().is_prorated() {
            let amount = unit_price
                .checked_mul(Decimal::from(quantity))
                .ok_or_else(|| BillingError::validation("invoice line amount overflow"))?;
            return Ok(Self {
                service_id: service.id_typed(),
                quantity,
                unit_price,
                amount: policy.rounding.round(amount),
                prorated: false,
            });
        }

        let amount = match first_invoice_enrollment {
            Some(enrolled_on) => first_invoice_amount(enrolled_on, unit_price, month, policy),
            None => unit_price,
        };
        Ok(Self {
            service_id: service.id_typed(),
            quantity: 1,
            unit_price,
            amount,
            prorated: amount != unit_price,
        })
    }
}

/// Input for issuing an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: CustomerId,
    pub category: ServiceCategory,
    pub billing_month: BillingMonth,
    pub lines: Vec<InvoiceLine>,
    pub issued_at: DateTime<Utc>,
}

/// A monthly invoice for one customer and one service category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub(crate) id: InvoiceId,
    pub(crate) number: String,
    pub(crate) customer_id: CustomerId,
    pub(crate) category: ServiceCategory,
    pub(crate) billing_month: BillingMonth,
    pub(crate) amount: Decimal,
    pub(crate) status: InvoiceStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) lines: Vec<InvoiceLine>,
}

impl Invoice {
    /// Issue a Pending invoice whose amount is the sum of its lines.
    pub fn issue(cmd: IssueInvoice, rounding: MoneyRounding) -> BillingResult<Self> {
        if cmd.lines.is_empty() {
            return Err(BillingError::validation("cannot issue invoice without lines"));
        }
        if cmd.number.trim().is_empty() {
            return Err(BillingError::validation("invoice number must not be blank"));
        }

        let mut amount = Decimal::ZERO;
        for line in &cmd.lines {
            if line.amount.is_sign_negative() {
                return Err(BillingError::validation("invoice line amount must not be negative"));
            }
            amount = amount
                .checked_add(line.amount)
                .ok_or_else(|| BillingError::validation("invoice total overflow"))?;
        }

        Ok(Self {
            id: cmd.invoice_id,
            number: cmd.number,
            customer_id: cmd.customer_id,
            category: cmd.category,
            billing_month: cmd.billing_month,
            amount: rounding.round(amount),
            status: InvoiceStatus::Pending,
            created_at: cmd.issued_at,
            lines: cmd.lines,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn category(&self) -> ServiceCategory {
        self.category
    }

    pub fn billing_month(&self) -> BillingMonth {
        self.billing_month
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    /// Amount still owed given what has been paid so far. Never negative.
    pub fn outstanding(&self, paid_total: Decimal) -> Decimal {
        (self.amount - paid_total).max(Decimal::ZERO)
    }

    /// Whether this invoice takes part in the one-per-period uniqueness rule.
    pub fn counts_for_period(&self) -> bool {
        self.status != InvoiceStatus::Cancelled
    }

    pub fn is_for_period(
        &self,
        customer_id: CustomerId,
        category: ServiceCategory,
        month: BillingMonth,
    ) -> bool {
        self.customer_id == customer_id && self.category == category && self.billing_month == month
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
