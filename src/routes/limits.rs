//! Per-IP throttling for the anonymous form endpoints.

use axum::http::HeaderMap;
use std::{collections::HashMap, net::SocketAddr};
use tokio::sync::RwLock;

use crate::error::{ApiError, ApiResult};

/// Sliding-window counter keyed by client address.
pub struct RateLimiter {
    window_secs: i64,
    max_hits: usize,
    hits: RwLock<HashMap<String, Vec<i64>>>,
}

impl RateLimiter {
    pub fn new(window_secs: i64, max_hits: usize) -> Self {
        Self {
            window_secs,
            max_hits,
            hits: RwLock::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` and reports whether it is within the limit.
    ///
    /// Expired entries are dropped on every call so the map stays proportional to
    /// the number of active clients.
    pub async fn check(&self, key: &str, now: i64) -> bool {
        let mut hits = self.hits.write().await;
        let window = self.window_secs;

        hits.retain(|_, stamps| {
            stamps.retain(|t| now - *t < window);
            !stamps.is_empty()
        });

        let stamps = hits.entry(key.to_string()).or_default();
        if stamps.len() >= self.max_hits {
            return false;
        }
        stamps.push(now);
        true
    }
}

lazy_static::lazy_static! {
    /// Quote wizard, contact form and newsletter sign-ups: 5 per 10 minutes.
    pub static ref PUBLIC_FORMS: RateLimiter = RateLimiter::new(600, 5);
}

/// Client address, preferring the first `x-forwarded-for` hop.
pub fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

pub async fn throttle_public_form(ip: &str, form: &str) -> ApiResult<()> {
    let key = format!("{}:{}", form, ip);
    if PUBLIC_FORMS.check(&key, chrono::Utc::now().timestamp()).await {
        Ok(())
    } else {
        tracing::warn!(ip = %ip, form = %form, "public form rate limited");
        Err(ApiError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_limit_and_window_expiry() {
        let limiter = RateLimiter::new(60, 2);
        assert!(limiter.check("1.2.3.4", 1_000).await);
        assert!(limiter.check("1.2.3.4", 1_010).await);
        assert!(!limiter.check("1.2.3.4", 1_020).await);
        // Other clients are unaffected.
        assert!(limiter.check("5.6.7.8", 1_020).await);
        // First hit has left the window.
        assert!(limiter.check("1.2.3.4", 1_061).await);
    }

    #[tokio::test]
    async fn test_stale_keys_are_evicted() {
        let limiter = RateLimiter::new(10, 1);
        assert!(limiter.check("a", 0).await);
        assert!(limiter.check("b", 100).await);
        assert_eq!(limiter.hits.read().await.len(), 1);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let addr = SocketAddr::from(([10, 0, 0, 1], 4000));
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, &addr), "10.0.0.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, &addr), "203.0.113.9");
    }
}
