//! Engine configuration.
//!
//! Every rounding rule and tolerance the engine applies is carried here so it
//! can be reviewed and tuned without touching the calculations.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cyclebill_core::{AllocationTolerance, AmountReviewThresholds, BillingError, BillingResult, MoneyRounding};
use cyclebill_invoicing::{NumberingPolicy, ProrationPolicy};

const ENV_PREFIX: &str = "CYCLEBILL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub numbering: NumberingPolicy,
    pub proration: ProrationPolicy,
    /// Rounding for invoice totals and payment totals.
    pub rounding: MoneyRounding,
    pub allocation_tolerance: AllocationTolerance,
    pub amount_review: AmountReviewThresholds,
    /// Foreign→local rate used when a payment carries none.
    pub default_exchange_rate: Decimal,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            numbering: NumberingPolicy::default(),
            proration: ProrationPolicy::default(),
            rounding: MoneyRounding::default(),
            allocation_tolerance: AllocationTolerance::default(),
            amount_review: AmountReviewThresholds::default(),
            default_exchange_rate: Decimal::ONE,
            log_level: "info".to_string(),
        }
    }
}

impl BillingConfig {
    /// Defaults overridden by `CYCLEBILL_*` environment variables.
    pub fn from_env() -> BillingResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> BillingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("INTERNET_NUMBER_FLOOR") {
            config.numbering.internet_floor = parse("INTERNET_NUMBER_FLOOR", &v)?;
        }
        if let Some(v) = get("STREAMING_SUFFIX") {
            config.numbering.streaming_suffix = v;
        }
        if let Some(v) = get("NAME_TOKEN_LEN") {
            config.numbering.name_token_len = parse("NAME_TOKEN_LEN", &v)?;
        }
        if let Some(v) = get("FALLBACK_TOKEN") {
            config.numbering.fallback_token = v;
        }
        if let Some(v) = get("PRORATION_ANCHOR_DAY") {
            config.proration.anchor_day = parse("PRORATION_ANCHOR_DAY", &v)?;
        }
        if let Some(v) = get("PRORATION_CYCLE_DAYS") {
            config.proration.cycle_days = parse("PRORATION_CYCLE_DAYS", &v)?;
        }
        if let Some(v) = get("ROUNDING") {
            let rounding = parse_rounding(&v)?;
            config.rounding = rounding;
            config.proration.rounding = rounding;
        }
        if let Some(v) = get("ALLOCATION_TOLERANCE") {
            config.allocation_tolerance = AllocationTolerance::new(parse("ALLOCATION_TOLERANCE", &v)?)?;
        }
        if let Some(v) = get("REVIEW_LOW") {
            config.amount_review.low = parse("REVIEW_LOW", &v)?;
        }
        if let Some(v) = get("REVIEW_HIGH") {
            config.amount_review.high = parse("REVIEW_HIGH", &v)?;
        }
        if let Some(v) = get("DEFAULT_EXCHANGE_RATE") {
            config.default_exchange_rate = parse("DEFAULT_EXCHANGE_RATE", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> BillingResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BillingError::validation(format!("invalid billing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BillingResult<()> {
        self.numbering.validate()?;
        self.proration.validate()?;
        AllocationTolerance::new(self.allocation_tolerance.ratio)?;
        AmountReviewThresholds::new(self.amount_review.low, self.amount_review.high)?;
        if self.default_exchange_rate <= Decimal::ZERO {
            return Err(BillingError::validation(format!(
                "default exchange rate must be positive, got {}",
                self.default_exchange_rate
            )));
        }
        if self.log_level.trim().is_empty() {
            return Err(BillingError::validation("log level must not be blank"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> BillingResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| BillingError::validation(format!("{ENV_PREFIX}{name}: cannot parse {raw:?}")))
}

fn parse_rounding(raw: &str) -> BillingResult<MoneyRounding> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "half_away_from_zero" | "half_up" => Ok(MoneyRounding::HalfAwayFromZero),
        "half_even" | "bankers" => Ok(MoneyRounding::HalfEven),
        other => Err(BillingError::validation(format!("{ENV_PREFIX}ROUNDING: unknown strategy {other:?}"))),
    }
}
