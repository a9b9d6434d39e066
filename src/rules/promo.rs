//! Promo code eligibility and discount arithmetic.
//!
//! Validation is advisory: it never reserves a use. `current_uses` only moves when the
//! payment provider reports a completed checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::models::PromoCode;
use crate::rules::plans::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "percentage" | "percent" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(format!("Unknown discount type '{}'", other)),
        }
    }
}

/// Discount granted by a valid code. `value` is a percentage (1..=100) or cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub discount_type: DiscountType,
    pub value: i64,
}

/// Why a code was refused, in the order the checks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    UsageExhausted,
    PlanNotEligible(Plan),
    Misconfigured,
}

impl PromoRejection {
    pub fn message(&self) -> String {
        match self {
            PromoRejection::NotFound => "Invalid promo code".to_string(),
            PromoRejection::Inactive => "This promo code is no longer active".to_string(),
            PromoRejection::NotYetValid => "This promo code is not valid yet".to_string(),
            PromoRejection::Expired => "This promo code has expired".to_string(),
            PromoRejection::UsageExhausted => {
                "This promo code has reached its usage limit".to_string()
            }
            PromoRejection::PlanNotEligible(plan) => {
                format!("This promo code does not apply to the {} plan", plan)
            }
            PromoRejection::Misconfigured => "This promo code cannot be applied".to_string(),
        }
    }
}

/// Price breakdown in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub original_price_cents: i64,
    pub discount_cents: i64,
    pub final_price_cents: i64,
}

/// Codes are stored upper-case and compared case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn validate_promo(
    promo: Option<&PromoCode>,
    plan: Plan,
    now: DateTime<Utc>,
) -> Result<Discount, PromoRejection> {
    let promo = promo.ok_or(PromoRejection::NotFound)?;

    if !promo.is_active {
        return Err(PromoRejection::Inactive);
    }

    // Both bounds inclusive.
    if now < promo.valid_from {
        return Err(PromoRejection::NotYetValid);
    }
    if let Some(until) = promo.valid_until {
        if now > until {
            return Err(PromoRejection::Expired);
        }
    }

    if let Some(max) = promo.max_uses {
        if promo.current_uses >= max {
            return Err(PromoRejection::UsageExhausted);
        }
    }

    if !promo.applicable_plans.is_empty()
        && !promo
            .applicable_plans
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(plan.as_str()))
    {
        return Err(PromoRejection::PlanNotEligible(plan));
    }

    let discount_type = promo
        .discount_type
        .parse::<DiscountType>()
        .map_err(|_| PromoRejection::Misconfigured)?;

    Ok(Discount {
        discount_type,
        value: promo.discount_value,
    })
}

/// Discount in cents for `price_cents`, never more than the price itself.
pub fn discount_cents(discount: &Discount, price_cents: i64) -> i64 {
    let raw = match discount.discount_type {
        // Round half up on integer cents.
        DiscountType::Percentage => (price_cents * discount.value + 50) / 100,
        DiscountType::Fixed => discount.value,
    };
    raw.clamp(0, price_cents.max(0))
}

pub fn apply_discount(discount: Option<&Discount>, price_cents: i64) -> PriceBreakdown {
    let off = discount.map(|d| discount_cents(d, price_cents)).unwrap_or(0);
    PriceBreakdown {
        original_price_cents: price_cents,
        discount_cents: off,
        final_price_cents: price_cents - off,
    }
}

/// Checks an admin-supplied code definition before it is stored.
pub fn validate_definition(
    code: &str,
    discount_type: DiscountType,
    value: i64,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
) -> Result<(), String> {
    let code = normalize_code(code);
    if code.len() < 3 || code.len() > 32 {
        return Err("Code must be between 3 and 32 characters".to_string());
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Code may only contain letters, numbers, '-' and '_'".to_string());
    }
    match discount_type {
        DiscountType::Percentage if !(1..=100).contains(&value) => {
            return Err("Percentage discount must be between 1 and 100".to_string());
        }
        DiscountType::Fixed if value <= 0 => {
            return Err("Fixed discount must be a positive amount in cents".to_string());
        }
        _ => {}
    }
    if let Some(until) = valid_until {
        if until < valid_from {
            return Err("valid_until must not be before valid_from".to_string());
        }
    }
    if let Some(max) = max_uses {
        if max <= 0 {
            return Err("max_uses must be positive, or omitted for unlimited".to_string());
        }
    }
    Ok(())
}
