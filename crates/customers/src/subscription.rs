use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cyclebill_core::{BillingError, BillingResult, CustomerId, Entity, ServiceId, SubscriptionId};

/// A customer's subscription to a catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    customer_id: CustomerId,
    service_id: ServiceId,
    quantity: u32,
    active: bool,
    started_on: NaiveDate,
}

impl Subscription {
    /// Quantity must be at least 1. It only affects per-unit (streaming) billing.
    pub fn new(
        id: SubscriptionId,
        customer_id: CustomerId,
        service_id: ServiceId,
        quantity: u32,
        started_on: NaiveDate,
    ) -> BillingResult<Self> {
        if quantity == 0 {
            return Err(BillingError::validation("subscription quantity must be at least 1"));
        }
        Ok(Self {
            id,
            customer_id,
            service_id,
            quantity,
            active: true,
            started_on,
        })
    }

    pub fn id_typed(&self) -> SubscriptionId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_on(&self) -> NaiveDate {
        self.started_on
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl Entity for Subscription {
    type Id = SubscriptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Active subscriptions that contribute to billing, one per service.
///
/// When several active subscriptions point at the same service, the earliest
/// start date wins (ties broken by id). Output is ordered by service id.
pub fn billable_subscriptions<'a, I>(subscriptions: I) -> Vec<&'a Subscription>
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let mut by_service: BTreeMap<ServiceId, &'a Subscription> = BTreeMap::new();
    for sub in subscriptions.into_iter().filter(|s| s.is_active()) {
        by_service
            .entry(sub.service_id)
            .and_modify(|kept| {
                if (sub.started_on, sub.id) < (kept.started_on, kept.id) {
                    *kept = sub;
                }
            })
            .or_insert(sub);
    }
    by_service.into_values().collect()
}
