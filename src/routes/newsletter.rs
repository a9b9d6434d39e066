/**
 * Newsletter Routes
 * Subscribe / unsubscribe and the admin subscriber list
 */
use axum::{
    extract::{ConnectInfo, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::db::{
    self,
    models::{NewsletterSubscription, NEWSLETTER_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::limits::{client_ip, throttle_public_form};
use crate::routes::session::{authenticate, require_admin};
use crate::rules::messages::{is_plausible_email, SubscriptionStatus};

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriberQuery {
    pub status: Option<String>,
}

fn clean_email(email: &str) -> ApiResult<String> {
    if !is_plausible_email(email) {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    Ok(email.trim().to_lowercase())
}

/// POST /api/newsletter - Subscribe, reactivating a previous subscription
pub async fn subscribe(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = clean_email(&payload.email)?;
    throttle_public_form(&client_ip(&headers, &addr), "newsletter").await?;

    let pool = db::require_pool()?;
    sqlx::query(
        r#"
        INSERT INTO newsletter_subscriptions (email, source)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET
            status = 'active',
            source = COALESCE(EXCLUDED.source, newsletter_subscriptions.source),
            subscribed_at = CASE WHEN newsletter_subscriptions.status = 'active'
                THEN newsletter_subscriptions.subscribed_at ELSE now() END,
            unsubscribed_at = NULL
        "#,
    )
    .bind(&email)
    .bind(&payload.source)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(source = ?payload.source, "newsletter subscription");
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

/// POST /api/newsletter/unsubscribe
///
/// Answers success for unknown addresses so the endpoint cannot be used to
/// probe the list.
pub async fn unsubscribe(Json(payload): Json<UnsubscribeRequest>) -> ApiResult<Json<SuccessResponse>> {
    let email = clean_email(&payload.email)?;
    let pool = db::require_pool()?;

    sqlx::query(
        "UPDATE newsletter_subscriptions SET status = $2, unsubscribed_at = now() \
         WHERE email = $1 AND status <> $2",
    )
    .bind(&email)
    .bind(SubscriptionStatus::Unsubscribed.as_str())
    .execute(pool.as_ref())
    .await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/admin/newsletter
pub async fn list_subscribers(
    headers: HeaderMap,
    Query(query): Query<SubscriberQuery>,
) -> ApiResult<Json<Vec<NewsletterSubscription>>> {
    let claims = authenticate(&headers)?;
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<SubscriptionStatus>().map_err(ApiError::BadRequest)?),
        None => None,
    };

    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM newsletter_subscriptions WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY subscribed_at DESC",
        NEWSLETTER_COLUMNS
    );
    let subscribers = sqlx::query_as::<_, NewsletterSubscription>(&sql)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(subscribers))
}
