/**
 * Contact Message Routes
 * Public contact form and the admin inbox
 */
use axum::{
    extract::{ConnectInfo, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::db::{
    self,
    models::{ContactMessage, MESSAGE_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::limits::{client_ip, throttle_public_form};
use crate::routes::profiles::check_len;
use crate::routes::session::{authenticate, require_admin};
use crate::rules::messages::{is_plausible_email, stamp_message, MessageStatus};

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub status: MessageStatus,
}

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub status: Option<String>,
}

fn validate_contact(req: &ContactRequest) -> ApiResult<()> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !is_plausible_email(&req.email) {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }
    check_len("subject", &req.subject, 200)?;
    check_len("message", &Some(req.message.clone()), 5000)
}

/// POST /api/contact
pub async fn submit_contact(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<ContactRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_contact(&payload)?;
    throttle_public_form(&client_ip(&headers, &addr), "contact").await?;

    let pool = db::require_pool()?;
    let sql = format!(
        "INSERT INTO contact_messages (name, email, subject, message) VALUES ($1, $2, $3, $4) \
         RETURNING {}",
        MESSAGE_COLUMNS
    );
    let message = sqlx::query_as::<_, ContactMessage>(&sql)
        .bind(payload.name.trim())
        .bind(payload.email.trim().to_lowercase())
        .bind(&payload.subject)
        .bind(payload.message.trim())
        .fetch_one(pool.as_ref())
        .await?;

    tracing::info!(message_id = %message.id, "contact message received");
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

/// GET /api/admin/messages
pub async fn list_messages(
    headers: HeaderMap,
    Query(query): Query<MessageListQuery>,
) -> ApiResult<Json<Vec<ContactMessage>>> {
    let claims = authenticate(&headers)?;
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<MessageStatus>().map_err(ApiError::BadRequest)?),
        None => None,
    };

    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM contact_messages WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at DESC",
        MESSAGE_COLUMNS
    );
    let messages = sqlx::query_as::<_, ContactMessage>(&sql)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(messages))
}

/// PATCH /api/admin/messages/{id}
pub async fn update_message(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMessageRequest>,
) -> ApiResult<Json<ContactMessage>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!("SELECT {} FROM contact_messages WHERE id = $1", MESSAGE_COLUMNS);
    let existing = sqlx::query_as::<_, ContactMessage>(&sql)
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or(ApiError::NotFound)?;

    let (read_at, replied_at) =
        stamp_message(payload.status, existing.read_at, existing.replied_at, Utc::now());

    let sql = format!(
        "UPDATE contact_messages SET status = $2, read_at = $3, replied_at = $4 \
         WHERE id = $1 RETURNING {}",
        MESSAGE_COLUMNS
    );
    let message = sqlx::query_as::<_, ContactMessage>(&sql)
        .bind(existing.id)
        .bind(payload.status.as_str())
        .bind(read_at)
        .bind(replied_at)
        .fetch_one(pool.as_ref())
        .await?;
    Ok(Json(message))
}

/// DELETE /api/admin/messages/{id}
pub async fn delete_message(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let result = sqlx::query("DELETE FROM contact_messages WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(Json(SuccessResponse { success: true }))
}
