//! Database Models - structs representing database tables (used by sqlx/serde).
//!
//! Enum-valued columns are stored as TEXT; the typed accessors fall back to the
//! column default when a row carries an unknown value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::rules::{
    domains::SslStatus,
    messages::MessageStatus,
    plans::{Plan, Role},
    quotes::QuoteStatus,
};

/// Developer (or admin) profile. `id` is the identity provider's user id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub slug: String,
    pub role: String,
    pub subscription_tier: String,
    pub subscription_status: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub headline: Option<String>,
    pub hero_subtitle: Option<String>,
    pub about: Option<String>,
    pub cta_text: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub available_for_work: bool,
    pub technologies: Vec<String>,
    pub stats: Value,
    pub services: Value,
    pub process_steps: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn plan(&self) -> Plan {
        self.subscription_tier.parse().unwrap_or(Plan::Free)
    }

    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Developer)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

/// Portfolio project
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub slug: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub technologies: Vec<String>,
    pub client_name: Option<String>,
    pub project_url: Option<String>,
    pub repo_url: Option<String>,
    pub year: Option<i32>,
    pub published: bool,
    pub featured: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quote request received by a developer
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub project_type: String,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub description: String,
    pub features: Vec<String>,
    pub status: String,
    pub quoted_amount_cents: Option<i64>,
    pub owner_note: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn status(&self) -> QuoteStatus {
        self.status.parse().unwrap_or(QuoteStatus::New)
    }
}

/// Message sent through the platform contact form
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub status: String,
    pub read_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn status(&self) -> MessageStatus {
        self.status.parse().unwrap_or(MessageStatus::New)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterSubscription {
    pub id: Uuid,
    pub email: String,
    pub source: Option<String>,
    pub status: String,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// Discount code. `discount_value` is a percentage or an amount in cents.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub applicable_plans: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Custom domain or platform subdomain attached to a profile
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDomain {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub slug: String,
    pub is_primary: bool,
    pub ssl_status: String,
    pub verification_token: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CustomDomain {
    pub fn ssl_status(&self) -> SslStatus {
        self.ssl_status.parse().unwrap_or(SslStatus::Pending)
    }
}

/// Column lists kept next to the structs they hydrate.
pub const PROFILE_COLUMNS: &str = "id, email, full_name, slug, role, subscription_tier, \
    subscription_status, stripe_customer_id, stripe_subscription_id, current_period_end, \
    headline, hero_subtitle, about, cta_text, avatar_url, location, website_url, github_url, \
    linkedin_url, available_for_work, technologies, stats, services, process_steps, \
    created_at, updated_at";

pub const PROJECT_COLUMNS: &str = "id, profile_id, title, slug, category, description, \
    content, image_url, technologies, client_name, project_url, repo_url, year, published, \
    featured, sort_order, created_at, updated_at";

pub const QUOTE_COLUMNS: &str = "id, profile_id, name, email, phone, company, project_type, \
    budget_range, timeline, description, features, status, quoted_amount_cents, owner_note, \
    status_changed_at, created_at, updated_at";

pub const MESSAGE_COLUMNS: &str =
    "id, name, email, subject, message, status, read_at, replied_at, created_at";

pub const NEWSLETTER_COLUMNS: &str =
    "id, email, source, status, subscribed_at, unsubscribed_at";

pub const PROMO_COLUMNS: &str = "id, code, description, discount_type, discount_value, \
    valid_from, valid_until, max_uses, current_uses, applicable_plans, is_active, \
    created_at, updated_at";

pub const DOMAIN_COLUMNS: &str = "id, profile_id, domain, subdomain, slug, is_primary, \
    ssl_status, verification_token, verified_at, last_checked_at, created_at";

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str, tier: &str) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            email: "dev@example.com".to_string(),
            full_name: None,
            slug: "dev".to_string(),
            role: role.to_string(),
            subscription_tier: tier.to_string(),
            subscription_status: None,
            stripe_customer_id: Some("cus_123".to_string()),
            stripe_subscription_id: None,
            current_period_end: None,
            headline: None,
            hero_subtitle: None,
            about: None,
            cta_text: None,
            avatar_url: None,
            location: None,
            website_url: None,
            github_url: None,
            linkedin_url: None,
            available_for_work: true,
            technologies: vec![],
            stats: Value::Array(vec![]),
            services: Value::Array(vec![]),
            process_steps: Value::Array(vec![]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_profile_accessors_fall_back() {
        let p = profile("superuser", "gold");
        assert_eq!(p.role(), Role::Developer);
        assert_eq!(p.plan(), Plan::Free);
        assert!(!p.is_admin());

        let admin = profile("admin", "premium");
        assert!(admin.is_admin());
        assert_eq!(admin.plan(), Plan::Premium);
    }

    #[test]
    fn test_profile_hides_billing_ids() {
        let json = serde_json::to_value(profile("developer", "pro")).unwrap();
        assert!(json.get("stripeCustomerId").is_none());
        assert_eq!(json["subscriptionTier"], "pro");
    }
}
