use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cyclebill_core::{BillingError, BillingResult, Entity, ServiceCategory, ServiceId};

/// A billable catalog service (an internet plan, a streaming bundle, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    id: ServiceId,
    name: String,
    category: ServiceCategory,
    /// Monthly unit price in local currency.
    unit_price: Decimal,
    active: bool,
}

impl Service {
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        category: ServiceCategory,
        unit_price: Decimal,
    ) -> BillingResult<Self> {
        if unit_price.is_sign_negative() {
            return Err(BillingError::validation("service unit price must not be negative"));
        }
        Ok(Self {
            id,
            name: name.into(),
            category,
            unit_price,
            active: true,
        })
    }

    pub fn id_typed(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ServiceCategory {
        self.category
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn reprice(&mut self, unit_price: Decimal) -> BillingResult<()> {
        if unit_price.is_sign_negative() {
            return Err(BillingError::validation("service unit price must not be negative"));
        }
        self.unit_price = unit_price;
        Ok(())
    }
}

impl Entity for Service {
    type Id = ServiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
