//! Custom domain lifecycle.

use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Record name prefix holding the verification token.
pub const VERIFICATION_RECORD_PREFIX: &str = "_devfolio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslStatus {
    Pending,
    Active,
    Failed,
    Expired,
}

impl SslStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslStatus::Pending => "pending",
            SslStatus::Active => "active",
            SslStatus::Failed => "failed",
            SslStatus::Expired => "expired",
        }
    }
}

impl FromStr for SslStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SslStatus::Pending),
            "active" => Ok(SslStatus::Active),
            "failed" => Ok(SslStatus::Failed),
            "expired" => Ok(SslStatus::Expired),
            other => Err(format!("Unknown ssl status '{}'", other)),
        }
    }
}

/// Status after a manual verify run.
pub fn status_after_verification(previous: SslStatus, passed: bool) -> SslStatus {
    match (passed, previous) {
        (true, _) => SslStatus::Active,
        (false, SslStatus::Active) | (false, SslStatus::Expired) => SslStatus::Expired,
        (false, _) => SslStatus::Failed,
    }
}

pub fn generate_verification_token() -> String {
    format!(
        "devfolio-verify={}",
        Alphanumeric.sample_string(&mut rand::rng(), 32)
    )
}

pub fn verification_record_name(domain: &str) -> String {
    format!("{}.{}", VERIFICATION_RECORD_PREFIX, domain)
}

/// Subdomain labels: 3-40 chars, lowercase alphanumerics and inner hyphens.
pub fn is_valid_subdomain_label(label: &str) -> bool {
    const RESERVED: &[&str] = &["www", "api", "app", "admin", "mail", "sites", "status"];
    crate::rules::slug::is_valid_profile_slug(label) && !RESERVED.contains(&label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_active_or_failed() {
        assert_eq!(
            status_after_verification(SslStatus::Pending, true),
            SslStatus::Active
        );
        assert_eq!(
            status_after_verification(SslStatus::Pending, false),
            SslStatus::Failed
        );
        assert_eq!(
            status_after_verification(SslStatus::Failed, true),
            SslStatus::Active
        );
    }

    #[test]
    fn test_active_domain_that_fails_becomes_expired() {
        assert_eq!(
            status_after_verification(SslStatus::Active, false),
            SslStatus::Expired
        );
        assert_eq!(
            status_after_verification(SslStatus::Expired, false),
            SslStatus::Expired
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_verification_token();
        let b = generate_verification_token();
        assert!(a.starts_with("devfolio-verify="));
        assert_eq!(a.len(), "devfolio-verify=".len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_name() {
        assert_eq!(
            verification_record_name("janedoe.dev"),
            "_devfolio.janedoe.dev"
        );
    }

    #[test]
    fn test_subdomain_labels() {
        assert!(is_valid_subdomain_label("jane-doe"));
        assert!(!is_valid_subdomain_label("www"));
        assert!(!is_valid_subdomain_label("Jane"));
        assert!(!is_valid_subdomain_label("jane.doe"));
    }
}
