/**
 * Billing Routes
 * Subscription overview, hosted checkout, customer portal and payment webhooks
 */
use axum::{
    body::Bytes,
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::billing::{
    catalogue,
    stripe::{self, CheckoutRequest, StripeError, WebhookEvent},
    subscription_change, PlanOffer, SubscriptionChange,
};
use crate::config::settings;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::routes::promo_codes::find_promo;
use crate::routes::session::{authenticate, load_or_create_profile};
use crate::rules::plans::{BillingCycle, Plan};
use crate::rules::promo::{apply_discount, validate_promo, PriceBreakdown};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingOverview {
    pub plan: Plan,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub has_billing_account: bool,
    pub plans: Vec<PlanOffer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    pub promo_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
    pub pricing: PriceBreakdown,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn provider_error(e: StripeError) -> ApiError {
    match e {
        StripeError::NotConfigured => ApiError::Internal(e.to_string()),
        other => ApiError::Upstream(other.to_string()),
    }
}

/// GET /api/billing
pub async fn get_billing(headers: HeaderMap) -> ApiResult<Json<BillingOverview>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    Ok(Json(BillingOverview {
        plan: me.plan(),
        subscription_status: me.subscription_status.clone(),
        current_period_end: me.current_period_end,
        has_billing_account: me.stripe_customer_id.is_some(),
        plans: catalogue(),
    }))
}

/// POST /api/checkout - Hosted checkout session for a paid plan
pub async fn create_checkout(
    headers: HeaderMap,
    Json(payload): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let claims = authenticate(&headers)?;
    if !payload.plan.is_paid() {
        return Err(ApiError::bad_request("Choose a paid plan to check out"));
    }

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let price = payload.plan.price_cents(payload.billing_cycle);
    let code = payload
        .promo_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    // Re-checked here; the use is only counted once the provider confirms payment.
    let (pricing, promo_code_id) = match code {
        Some(code) => {
            let promo = find_promo(pool.as_ref(), code).await?;
            let discount = validate_promo(promo.as_ref(), payload.plan, Utc::now())
                .map_err(|r| ApiError::BadRequest(r.message()))?;
            (
                apply_discount(Some(&discount), price),
                promo.map(|p| p.id.to_string()),
            )
        }
        None => (apply_discount(None, price), None),
    };

    let site = settings().site_url.trim_end_matches('/').to_string();
    let request = CheckoutRequest {
        profile_id: me.id.to_string(),
        email: me.email.clone(),
        customer_id: me.stripe_customer_id.clone(),
        plan: payload.plan,
        cycle: payload.billing_cycle,
        unit_amount_cents: pricing.final_price_cents,
        promo_code_id,
        success_url: format!("{}/dashboard/billing?checkout=success", site),
        cancel_url: format!("{}/dashboard/billing?checkout=cancelled", site),
    };

    let session = stripe::client()
        .create_checkout_session(&request)
        .await
        .map_err(provider_error)?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
        pricing,
    }))
}

/// POST /api/billing/portal
pub async fn create_portal(headers: HeaderMap) -> ApiResult<Json<PortalResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let customer = me
        .stripe_customer_id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("No billing account yet. Subscribe to a plan first."))?;

    let return_url = format!(
        "{}/dashboard/billing",
        settings().site_url.trim_end_matches('/')
    );
    let url = stripe::client()
        .create_portal_session(customer, &return_url)
        .await
        .map_err(provider_error)?;
    Ok(Json(PortalResponse { url }))
}

/// Applies a webhook-reported change to the profile it concerns.
async fn apply_change(pool: &PgPool, change: &SubscriptionChange) -> ApiResult<()> {
    match change {
        SubscriptionChange::Activated {
            profile_id,
            plan,
            customer_id,
            subscription_id,
            promo_code_id,
        } => {
            let mut tx = pool.begin().await?;
            let updated = sqlx::query(
                r#"
                UPDATE profiles SET
                    subscription_tier = $2,
                    subscription_status = 'active',
                    stripe_customer_id = COALESCE($3, stripe_customer_id),
                    stripe_subscription_id = COALESCE($4, stripe_subscription_id),
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(profile_id)
            .bind(plan.as_str())
            .bind(customer_id)
            .bind(subscription_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                tracing::warn!(profile_id = %profile_id, "checkout completed for unknown profile");
            }

            if let Some(promo_id) = promo_code_id {
                // Guarded so concurrent checkouts cannot push past max_uses.
                let redeemed = sqlx::query(
                    "UPDATE promo_codes SET current_uses = current_uses + 1, updated_at = now() \
                     WHERE id = $1 AND (max_uses IS NULL OR current_uses < max_uses)",
                )
                .bind(promo_id)
                .execute(&mut *tx)
                .await?;
                if redeemed.rows_affected() == 0 {
                    tracing::warn!(promo_code_id = %promo_id, "promo code redeemed past its limit");
                }
            }
            tx.commit().await?;
            tracing::info!(profile_id = %profile_id, plan = %plan, "subscription activated");
        }
        SubscriptionChange::Updated {
            subscription_id,
            status,
            current_period_end,
        } => {
            sqlx::query(
                "UPDATE profiles SET subscription_status = $2, \
                 current_period_end = COALESCE($3, current_period_end), updated_at = now() \
                 WHERE stripe_subscription_id = $1",
            )
            .bind(subscription_id)
            .bind(status)
            .bind(current_period_end)
            .execute(pool)
            .await?;
            tracing::info!(subscription_id = %subscription_id, status = %status, "subscription updated");
        }
        SubscriptionChange::Canceled { subscription_id } => {
            sqlx::query(
                "UPDATE profiles SET subscription_tier = 'free', subscription_status = 'canceled', \
                 updated_at = now() WHERE stripe_subscription_id = $1",
            )
            .bind(subscription_id)
            .execute(pool)
            .await?;
            tracing::info!(subscription_id = %subscription_id, "subscription canceled");
        }
    }
    Ok(())
}

/// Signed webhook body checked against `secret` and decoded.
fn parse_webhook(body: &[u8], signature: &str, secret: &str, now: i64) -> ApiResult<WebhookEvent> {
    stripe::verify_signature(body, signature, secret, now).map_err(|e| {
        tracing::warn!(error = %e, "rejected webhook");
        ApiError::bad_request(e.to_string())
    })?;

    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))
}

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(headers: HeaderMap, body: Bytes) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let event = parse_webhook(
        &body,
        signature,
        &settings().stripe_webhook_secret,
        Utc::now().timestamp(),
    )?;

    match subscription_change(&event) {
        Some(change) => {
            let pool = db::require_pool()?;
            apply_change(pool.as_ref(), &change).await?;
        }
        None => {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "webhook ignored");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::session::test_token;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn billing_router() -> Router {
        Router::new()
            .route("/api/billing", get(get_billing))
            .route("/api/checkout", post(create_checkout))
            .route("/api/webhooks/stripe", post(stripe_webhook))
    }

    #[test]
    fn test_provider_error_mapping() {
        assert!(matches!(
            provider_error(StripeError::NotConfigured),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            provider_error(StripeError::Api {
                status: 402,
                message: "card declined".into()
            }),
            ApiError::Upstream(_)
        ));
    }

    #[tokio::test]
    async fn test_free_plan_checkout_rejected() {
        let res = billing_router()
            .oneshot(
                Request::post("/api/checkout")
                    .header("authorization", format!("Bearer {}", test_token(Uuid::new_v4())))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"plan":"free","billingCycle":"monthly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_billing_requires_auth() {
        let res = billing_router()
            .oneshot(Request::get("/api/billing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_without_signature_rejected() {
        let res = billing_router()
            .oneshot(
                Request::post("/api/webhooks/stripe")
                    .body(Body::from(r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_webhook_signed_with_other_secret_rejected() {
        let payload = r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#;
        let now = Utc::now().timestamp();
        let forged = stripe::sign_for_test(payload.as_bytes(), "whsec_wrong", now);

        match parse_webhook(payload.as_bytes(), &forged, "whsec_real", now) {
            Err(ApiError::BadRequest(message)) => {
                assert_eq!(message, stripe::SignatureError::Mismatch.to_string())
            }
            other => panic!("expected signature mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_webhook_with_valid_signature_decodes() {
        let payload = r#"{"id":"evt_2","type":"invoice.paid","data":{"object":{}}}"#;
        let now = Utc::now().timestamp();
        let signature = stripe::sign_for_test(payload.as_bytes(), "whsec_real", now);

        let event = parse_webhook(payload.as_bytes(), &signature, "whsec_real", now).unwrap();
        assert_eq!(event.id, "evt_2");
        assert_eq!(event.event_type, "invoice.paid");
    }

    #[tokio::test]
    async fn test_webhook_without_signature_header_rejected() {
        let payload = r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#;
        let res = billing_router()
            .oneshot(
                Request::post("/api/webhooks/stripe")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
