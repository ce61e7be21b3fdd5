use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cyclebill_core::{BillingError, BillingResult, CustomerId, Entity, InvoiceId, MoneyRounding, PaymentId};

/// How a payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChannel {
    /// Cash at the counter. The only channel that can owe change.
    Physical,
    /// Transfers, mobile payments, cards.
    Electronic,
    /// Part physical, part electronic.
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Local,
    Foreign,
}

/// Amounts received through one channel, per currency.
///
/// A leg with neither amount set is absent (older records only carry the
/// legacy single amount).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentLeg {
    pub local: Option<Decimal>,
    pub foreign: Option<Decimal>,
}

impl PaymentLeg {
    pub fn new(local: Decimal, foreign: Decimal) -> Self {
        Self {
            local: Some(local),
            foreign: Some(foreign),
        }
    }

    pub fn local(amount: Decimal) -> Self {
        Self {
            local: Some(amount),
            foreign: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.local.is_none() && self.foreign.is_none()
    }

    /// Leg value in local currency.
    pub fn value(&self, rate: Decimal) -> BillingResult<Decimal> {
        self.foreign
            .unwrap_or_default()
            .checked_mul(rate)
            .and_then(|foreign| foreign.checked_add(self.local.unwrap_or_default()))
            .ok_or_else(total_overflow)
    }

    fn amounts(&self) -> impl Iterator<Item = Decimal> {
        self.local.into_iter().chain(self.foreign)
    }
}

/// Pre-leg representation: one amount in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAmount {
    pub amount: Decimal,
    pub currency: Currency,
}

impl LegacyAmount {
    pub fn value(&self, rate: Decimal) -> BillingResult<Decimal> {
        match self.currency {
            Currency::Local => Ok(self.amount),
            Currency::Foreign => self.amount.checked_mul(rate).ok_or_else(total_overflow),
        }
    }
}

fn total_overflow() -> BillingError {
    BillingError::validation("payment total overflow")
}

/// What was handed over, independent of which invoices it pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub channel: PaymentChannel,
    pub physical: PaymentLeg,
    pub electronic: PaymentLeg,
    pub legacy: Option<LegacyAmount>,
    /// Foreign→local rate. When absent the configured default applies.
    pub exchange_rate: Option<Decimal>,
}

impl Tender {
    pub fn physical(leg: PaymentLeg) -> Self {
        Self {
            channel: PaymentChannel::Physical,
            physical: leg,
            electronic: PaymentLeg::default(),
            legacy: None,
            exchange_rate: None,
        }
    }

    pub fn electronic(leg: PaymentLeg) -> Self {
        Self {
            channel: PaymentChannel::Electronic,
            physical: PaymentLeg::default(),
            electronic: leg,
            legacy: None,
            exchange_rate: None,
        }
    }

    pub fn mixed(physical: PaymentLeg, electronic: PaymentLeg) -> Self {
        Self {
            channel: PaymentChannel::Mixed,
            physical,
            electronic,
            legacy: None,
            exchange_rate: None,
        }
    }

    pub fn legacy(channel: PaymentChannel, amount: Decimal, currency: Currency) -> Self {
        Self {
            channel,
            physical: PaymentLeg::default(),
            electronic: PaymentLeg::default(),
            legacy: Some(LegacyAmount { amount, currency }),
            exchange_rate: None,
        }
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    /// The rate this tender converts foreign amounts with.
    pub fn effective_rate(&self, default_rate: Decimal) -> Decimal {
        self.exchange_rate.unwrap_or(default_rate)
    }

    /// Total value in local currency, rounded to cents.
    ///
    /// Mixed sums both legs. A single channel uses its own leg, or the legacy
    /// amount when that leg is absent.
    pub fn total(&self, default_rate: Decimal, rounding: MoneyRounding) -> BillingResult<Decimal> {
        self.validate()?;
        let rate = self.effective_rate(default_rate);
        if rate <= Decimal::ZERO {
            return Err(BillingError::validation(format!("exchange rate must be positive, got {rate}")));
        }

        let single = |leg: &PaymentLeg| match (leg.is_absent(), self.legacy) {
            (true, Some(legacy)) => legacy.value(rate),
            _ => leg.value(rate),
        };
        let total = match self.channel {
            PaymentChannel::Mixed => self
                .physical
                .value(rate)?
                .checked_add(self.electronic.value(rate)?)
                .ok_or_else(total_overflow)?,
            PaymentChannel::Physical => single(&self.physical)?,
            PaymentChannel::Electronic => single(&self.electronic)?,
        };
        Ok(rounding.round(total))
    }

    fn validate(&self) -> BillingResult<()> {
        let negative = self
            .physical
            .amounts()
            .chain(self.electronic.amounts())
            .chain(self.legacy.map(|l| l.amount))
            .any(|a| a.is_sign_negative());
        if negative {
            return Err(BillingError::validation("payment amounts must not be negative"));
        }
        Ok(())
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub tender: Tender,
    /// Single-invoice shortcut: pay this invoice directly, without link rows.
    pub invoice_id: Option<InvoiceId>,
    /// Cash handed over for a physical payment, when change must be computed.
    pub received: Option<Decimal>,
    pub reference: Option<String>,
}

impl NewPayment {
    pub fn new(tender: Tender) -> Self {
        Self {
            tender,
            invoice_id: None,
            received: None,
            reference: None,
        }
    }

    pub fn for_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    pub fn with_received(mut self, received: Decimal) -> Self {
        self.received = Some(received);
        self
    }
}

/// Input for [`Payment::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub customer_id: CustomerId,
    pub payment: NewPayment,
    /// Rate applied when the tender carries none.
    pub default_rate: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    customer_id: CustomerId,
    created_at: DateTime<Utc>,
    tender: Tender,
    /// Rate actually used for the total.
    exchange_rate: Decimal,
    total: Decimal,
    invoice_id: Option<InvoiceId>,
    received: Option<Decimal>,
    change_due: Decimal,
    reference: Option<String>,
}

impl Payment {
    /// Freeze a tender into a payment: total, rate used and change due.
    ///
    /// Fails when the total is not positive.
    pub fn record(cmd: RecordPayment, rounding: MoneyRounding) -> BillingResult<Self> {
        let NewPayment {
            tender,
            invoice_id,
            received,
            reference,
        } = cmd.payment;

        let total = tender.total(cmd.default_rate, rounding)?;
        if total <= Decimal::ZERO {
            return Err(BillingError::validation("payment total must be positive"));
        }
        if received.is_some_and(|r| r.is_sign_negative()) {
            return Err(BillingError::validation("received amount must not be negative"));
        }

        Ok(Self {
            id: cmd.payment_id,
            customer_id: cmd.customer_id,
            created_at: cmd.recorded_at,
            tender,
            exchange_rate: tender.effective_rate(cmd.default_rate),
            total,
            invoice_id,
            received,
            change_due: change_due(tender.channel, received, total),
            reference,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn tender(&self) -> &Tender {
        &self.tender
    }

    pub fn channel(&self) -> PaymentChannel {
        self.tender.channel
    }

    pub fn exchange_rate(&self) -> Decimal {
        self.exchange_rate
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Invoice paid directly (single-invoice shortcut), if any.
    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn received(&self) -> Option<Decimal> {
        self.received
    }

    pub fn change_due(&self) -> Decimal {
        self.change_due
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Change owed to the customer. Only physical payments give change.
pub fn change_due(channel: PaymentChannel, received: Option<Decimal>, total: Decimal) -> Decimal {
    match (channel, received) {
        (PaymentChannel::Physical, Some(received)) => (received - total).max(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}
