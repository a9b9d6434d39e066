//! Subscription tiers, roles and list prices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Developer,
}

pub const ALL_PLANS: [Plan; 3] = [Plan::Free, Plan::Pro, Plan::Premium];

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Premium => "premium",
        }
    }

    /// List price in cents for one billing period.
    pub fn price_cents(&self, cycle: BillingCycle) -> i64 {
        match (self, cycle) {
            (Plan::Free, _) => 0,
            (Plan::Pro, BillingCycle::Monthly) => 900,
            (Plan::Pro, BillingCycle::Yearly) => 9_000,
            (Plan::Premium, BillingCycle::Monthly) => 1_900,
            (Plan::Premium, BillingCycle::Yearly) => 19_000,
        }
    }

    /// Maximum number of projects a profile on this plan may hold. `None` is unlimited.
    pub fn project_limit(&self) -> Option<i64> {
        match self {
            Plan::Free => Some(3),
            Plan::Pro => Some(25),
            Plan::Premium => None,
        }
    }

    pub fn allows_custom_domain(&self) -> bool {
        !matches!(self, Plan::Free)
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Recurring interval name used by the payment provider.
    pub fn interval(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "month",
            BillingCycle::Yearly => "year",
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Developer => "developer",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("Unknown plan '{}'", other)),
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "month" => Ok(BillingCycle::Monthly),
            "yearly" | "year" | "annual" => Ok(BillingCycle::Yearly),
            other => Err(format!("Unknown billing cycle '{}'", other)),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yearly_is_cheaper_than_twelve_months() {
        for plan in [Plan::Pro, Plan::Premium] {
            assert!(
                plan.price_cents(BillingCycle::Yearly) < 12 * plan.price_cents(BillingCycle::Monthly)
            );
        }
    }

    #[test]
    fn test_free_plan_limits() {
        assert_eq!(Plan::Free.price_cents(BillingCycle::Monthly), 0);
        assert_eq!(Plan::Free.project_limit(), Some(3));
        assert!(!Plan::Free.allows_custom_domain());
        assert_eq!(Plan::Premium.project_limit(), None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PRO".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!("annual".parse::<BillingCycle>().unwrap(), BillingCycle::Yearly);
        assert_eq!(" Admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Premium).unwrap(), "\"premium\"");
        let cycle: BillingCycle = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(cycle, BillingCycle::Monthly);
    }
}
