//! Payment provider client: hosted checkout, customer portal and webhook signatures.

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use crate::config::settings;
use crate::rules::plans::{BillingCycle, Plan};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Payment provider is not configured")]
    NotConfigured,

    #[error("Payment provider request failed: {0}")]
    Transport(String),

    #[error("Payment provider rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing or malformed Stripe-Signature header")]
    Malformed,

    #[error("Webhook timestamp outside tolerance")]
    Stale,

    #[error("No matching webhook signature")]
    Mismatch,
}

/// What to sell in a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub profile_id: String,
    pub email: String,
    pub customer_id: Option<String>,
    pub plan: Plan,
    pub cycle: BillingCycle,
    pub unit_amount_cents: i64,
    pub promo_code_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PortalSession {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Webhook envelope; `data.object` stays untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: Value,
}

pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default payment client");
                reqwest::Client::new()
            });
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            currency: currency.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, StripeError> {
        if !self.is_configured() {
            return Err(StripeError::NotConfigured);
        }

        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(path = %path, error = %e, "payment provider request failed");
                StripeError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!(path = %path, status = %status, message = %message, "payment provider returned error");
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StripeError::Decode(e.to_string()))
    }

    pub async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, StripeError> {
        let form = checkout_form(req, &self.currency);
        let session: CheckoutSession = self.post_form("/v1/checkout/sessions", &form).await?;
        tracing::info!(
            session_id = %session.id,
            profile_id = %req.profile_id,
            plan = %req.plan,
            "checkout session created"
        );
        Ok(session)
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeError> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        let session: PortalSession = self
            .post_form("/v1/billing_portal/sessions", &form)
            .await?;
        Ok(session.url)
    }
}

fn checkout_form(req: &CheckoutRequest, currency: &str) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode", "subscription".to_string()),
        ("success_url", req.success_url.clone()),
        ("cancel_url", req.cancel_url.clone()),
        ("client_reference_id", req.profile_id.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", currency.to_string()),
        (
            "line_items[0][price_data][unit_amount]",
            req.unit_amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][recurring][interval]",
            req.cycle.interval().to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            format!("Devfolio {} ({})", capitalize(req.plan.as_str()), req.cycle.as_str()),
        ),
        ("metadata[profile_id]", req.profile_id.clone()),
        ("metadata[plan]", req.plan.as_str().to_string()),
        ("metadata[billing_cycle]", req.cycle.as_str().to_string()),
        ("subscription_data[metadata][profile_id]", req.profile_id.clone()),
        ("subscription_data[metadata][plan]", req.plan.as_str().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    match &req.customer_id {
        Some(customer) => form.push(("customer".to_string(), customer.clone())),
        None => form.push(("customer_email".to_string(), req.email.clone())),
    }
    if let Some(promo) = &req.promo_code_id {
        form.push(("metadata[promo_code_id]".to_string(), promo.clone()));
    }
    form
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`).
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() || secret.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_unix - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Stale);
    }

    let matched = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

static CLIENT: Lazy<StripeClient> = Lazy::new(|| {
    let s = settings();
    StripeClient::new(
        s.stripe_api_base.clone(),
        s.stripe_secret_key.clone(),
        s.billing_currency.clone(),
        Duration::from_secs(s.outbound_timeout_secs),
    )
});

pub fn client() -> &'static StripeClient {
    &CLIENT
}

#[cfg(test)]
pub(crate) fn sign_for_test(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
