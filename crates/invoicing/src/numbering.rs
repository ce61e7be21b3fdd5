//! Invoice numbering: one independent, increasing sequence per category.
//!
//! Numbers look like `0179-AnaPerez-112024` (Internet) or `0003-AnaPerez-112024-S`
//! (Streaming). The category is recognised by the trailing suffix marker; the
//! sequence value is the leading numeric token.
//!
//! `next_number` scans existing numbers, so callers must hold the store's
//! exclusive transaction while they scan and insert.

use serde::{Deserialize, Serialize};

use cyclebill_core::{BillingError, BillingMonth, BillingResult, ServiceCategory};

const DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingPolicy {
    /// Lowest number ever issued on the Internet track.
    pub internet_floor: u32,
    /// Marker appended to Streaming numbers.
    pub streaming_suffix: String,
    /// Maximum length of the customer-name token.
    pub name_token_len: usize,
    /// Token used when the customer name is blank.
    pub fallback_token: String,
}

impl NumberingPolicy {
    pub fn validate(&self) -> BillingResult<()> {
        if self.streaming_suffix.is_empty() {
            return Err(BillingError::validation("streaming suffix must not be empty"));
        }
        if self.name_token_len == 0 {
            return Err(BillingError::validation("name token length must be positive"));
        }
        if self.fallback_token.trim().is_empty() {
            return Err(BillingError::validation("fallback token must not be blank"));
        }
        Ok(())
    }

    /// Which track an existing number belongs to.
    pub fn category_of(&self, number: &str) -> ServiceCategory {
        if number.ends_with(self.streaming_suffix.as_str()) {
            ServiceCategory::Streaming
        } else {
            ServiceCategory::Internet
        }
    }
}

impl Default for NumberingPolicy {
    fn default() -> Self {
        Self {
            internet_floor: 179,
            streaming_suffix: "-S".to_string(),
            name_token_len: 10,
            fallback_token: "CLIENTE".to_string(),
        }
    }
}

/// The leading numeric token of an invoice number, if any.
pub fn leading_number(number: &str) -> Option<u32> {
    number.split(DELIMITER).next()?.trim().parse().ok()
}

/// Next sequence value for `category` given every existing invoice number.
///
/// Numbers of the other track and numbers without a numeric prefix are ignored.
pub fn next_number<'a, I>(existing: I, category: ServiceCategory, policy: &NumberingPolicy) -> BillingResult<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter(|n| policy.category_of(n) == category)
        .filter_map(leading_number)
        .max();

    let overflow = || BillingError::validation(format!("{category} invoice sequence exhausted"));
    match category {
        ServiceCategory::Internet => match max {
            Some(max) if max >= policy.internet_floor => max.checked_add(1).ok_or_else(overflow),
            _ => Ok(policy.internet_floor),
        },
        ServiceCategory::Streaming => match max {
            Some(max) => max.checked_add(1).ok_or_else(overflow),
            None => Ok(1),
        },
    }
}

/// Customer-name token: whitespace removed, truncated, or the fallback when blank.
pub fn customer_token(name: &str, policy: &NumberingPolicy) -> String {
    let token: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(policy.name_token_len)
        .collect();
    if token.is_empty() {
        policy.fallback_token.clone()
    } else {
        token
    }
}

pub fn format_number(
    sequence: u32,
    customer_name: &str,
    month: BillingMonth,
    category: ServiceCategory,
    policy: &NumberingPolicy,
) -> String {
    let suffix = match category {
        ServiceCategory::Internet => "",
        ServiceCategory::Streaming => policy.streaming_suffix.as_str(),
    };
    format!(
        "{sequence:04}{DELIMITER}{}{DELIMITER}{:02}{:04}{suffix}",
        customer_token(customer_name, policy),
        month.month(),
        month.year(),
    )
}
