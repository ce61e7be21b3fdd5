use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cyclebill_core::{CustomerId, Entity};

/// A billed account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    enrolled_on: NaiveDate,
    active: bool,
    paid_invoice_count: u32,
}

impl Customer {
    pub fn new(id: CustomerId, name: impl Into<String>, enrolled_on: NaiveDate) -> Self {
        Self {
            id,
            name: name.into(),
            enrolled_on,
            active: true,
            paid_invoice_count: 0,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enrollment (creation) date. Immutable; it anchors first-invoice proration.
    pub fn enrolled_on(&self) -> NaiveDate {
        self.enrolled_on
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn paid_invoice_count(&self) -> u32 {
        self.paid_invoice_count
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    /// One of the customer's invoices crossed Pending→Paid.
    pub fn record_settled(&mut self) {
        self.paid_invoice_count = self.paid_invoice_count.saturating_add(1);
    }

    /// One of the customer's invoices crossed Paid→Pending.
    ///
    /// Saturates at zero.
    pub fn record_reopened(&mut self) {
        self.paid_invoice_count = self.paid_invoice_count.saturating_sub(1);
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
