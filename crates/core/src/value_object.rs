//! Value objects: equality by value, not identity.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Service family. Drives invoice numbering tracks and proration eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    /// Primary category: prorated on the first invoice, floored numbering.
    Internet,
    /// Secondary category: billed per unit, never prorated.
    Streaming,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 2] = [ServiceCategory::Internet, ServiceCategory::Streaming];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Internet => "internet",
            ServiceCategory::Streaming => "streaming",
        }
    }

    /// Whether the first invoice of a customer is prorated for this category.
    pub fn is_prorated(&self) -> bool {
        matches!(self, ServiceCategory::Internet)
    }
}

impl core::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ValueObject for ServiceCategory {}

/// A calendar month being billed (year + month, normalized to the 1st).
///
/// Navigation (`next`/`previous`) saturates at the edges of the supported
/// calendar range instead of failing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "NaiveDate", into = "NaiveDate")]
pub struct BillingMonth(NaiveDate);

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> BillingResult<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| BillingError::validation(format!("invalid billing month {year}-{month:02}")))
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        // Day 1 of an existing month always exists.
        Self(date.with_day(1).unwrap_or(date))
    }

    /// The calendar month before the one containing `date` ("consume then bill").
    pub fn preceding(date: NaiveDate) -> Self {
        Self::containing(date).previous()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn next(&self) -> Self {
        Self(self.0.checked_add_months(Months::new(1)).unwrap_or(self.0))
    }

    pub fn previous(&self) -> Self {
        Self(self.0.checked_sub_months(Months::new(1)).unwrap_or(self.0))
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        let next = self.next();
        if next == *self {
            return self.0;
        }
        next.0.pred_opt().unwrap_or(self.0)
    }

    /// The given day of this month, clamped to the month's last day.
    pub fn day(&self, day: u32) -> NaiveDate {
        let last = self.last_day();
        self.0.with_day(day.max(1)).unwrap_or(last).min(last)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }
}

impl TryFrom<NaiveDate> for BillingMonth {
    type Error = BillingError;

    fn try_from(value: NaiveDate) -> Result<Self, Self::Error> {
        if value.day() != 1 {
            return Err(BillingError::validation(format!(
                "billing month must be the first day of a month, got {value}"
            )));
        }
        Ok(Self(value))
    }
}

impl From<BillingMonth> for NaiveDate {
    fn from(value: BillingMonth) -> Self {
        value.0
    }
}

impl core::fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl ValueObject for BillingMonth {}
