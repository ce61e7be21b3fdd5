//! Foreign→local exchange rates.

use rust_decimal::Decimal;

use cyclebill_core::{BillingError, BillingResult};

/// Default rate applied to payments that do not carry their own.
pub trait ExchangeRateProvider: Send + Sync {
    fn default_rate(&self) -> BillingResult<Decimal>;
}

/// A fixed rate taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfiguredRate(Decimal);

impl ConfiguredRate {
    pub fn new(rate: Decimal) -> BillingResult<Self> {
        if rate <= Decimal::ZERO {
            return Err(BillingError::validation(format!("exchange rate must be positive, got {rate}")));
        }
        Ok(Self(rate))
    }

    pub fn rate(&self) -> Decimal {
        self.0
    }
}

impl ExchangeRateProvider for ConfiguredRate {
    fn default_rate(&self) -> BillingResult<Decimal> {
        Ok(self.0)
    }
}
