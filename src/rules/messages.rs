//! Contact inbox and newsletter statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    New,
    Read,
    Replied,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Unsubscribed,
    Bounced,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::New => "new",
            MessageStatus::Read => "read",
            MessageStatus::Replied => "replied",
            MessageStatus::Archived => "archived",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(MessageStatus::New),
            "read" => Ok(MessageStatus::Read),
            "replied" => Ok(MessageStatus::Replied),
            "archived" => Ok(MessageStatus::Archived),
            other => Err(format!("Unknown message status '{}'", other)),
        }
    }
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Unsubscribed => "unsubscribed",
            SubscriptionStatus::Bounced => "bounced",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "unsubscribed" => Ok(SubscriptionStatus::Unsubscribed),
            "bounced" => Ok(SubscriptionStatus::Bounced),
            other => Err(format!("Unknown subscription status '{}'", other)),
        }
    }
}

/// `read_at` / `replied_at` after setting `status`. Existing stamps are kept.
pub fn stamp_message(
    status: MessageStatus,
    read_at: Option<DateTime<Utc>>,
    replied_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match status {
        MessageStatus::Read => (read_at.or(Some(now)), replied_at),
        MessageStatus::Replied => (read_at.or(Some(now)), replied_at.or(Some(now))),
        MessageStatus::New | MessageStatus::Archived => (read_at, replied_at),
    }
}

/// Loose shape check; deliverability is the mail provider's problem.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
                && email.len() <= 254
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_read_sets_read_at_once() {
        let now = Utc::now();
        let earlier = now - Duration::hours(5);
        assert_eq!(
            stamp_message(MessageStatus::Read, None, None, now),
            (Some(now), None)
        );
        assert_eq!(
            stamp_message(MessageStatus::Read, Some(earlier), None, now),
            (Some(earlier), None)
        );
    }

    #[test]
    fn test_replied_implies_read() {
        let now = Utc::now();
        assert_eq!(
            stamp_message(MessageStatus::Replied, None, None, now),
            (Some(now), Some(now))
        );
    }

    #[test]
    fn test_archive_keeps_stamps() {
        let now = Utc::now();
        let earlier = now - Duration::days(1);
        assert_eq!(
            stamp_message(MessageStatus::Archived, Some(earlier), None, now),
            (Some(earlier), None)
        );
        assert_eq!(stamp_message(MessageStatus::New, None, None, now), (None, None));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_plausible_email("dev@example.com"));
        assert!(!is_plausible_email("dev@localhost"));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("a b@example.com"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Replied".parse::<MessageStatus>().unwrap(), MessageStatus::Replied);
        assert_eq!(
            "bounced".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Bounced
        );
        assert!("spam".parse::<MessageStatus>().is_err());
    }
}
