/**
 * Quote Routes
 * Public quote wizard submission and the owner's quote pipeline
 */
use axum::{
    extract::{ConnectInfo, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::db::{
    self,
    models::{Quote, QUOTE_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::limits::{client_ip, throttle_public_form};
use crate::routes::profiles::{check_len, clean_tags};
use crate::routes::session::{authenticate, ensure_owner_or_admin, load_or_create_profile};
use crate::rules::messages::is_plausible_email;
use crate::rules::quotes::{check_transition, QuoteStatus};

const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Request body for POST /api/quotes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequest {
    pub profile_slug: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub project_type: String,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteStatusRequest {
    pub status: QuoteStatus,
    pub quoted_amount_cents: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteListQuery {
    pub status: Option<String>,
}

fn validate_create(req: &CreateQuoteRequest) -> ApiResult<()> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !is_plausible_email(&req.email) {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if req.project_type.trim().is_empty() {
        return Err(ApiError::bad_request("Project type is required"));
    }
    if req.description.trim().is_empty() {
        return Err(ApiError::bad_request("Project description is required"));
    }
    check_len("name", &Some(req.name.clone()), 120)?;
    check_len("description", &Some(req.description.clone()), MAX_DESCRIPTION_CHARS)?;
    check_len("phone", &req.phone, 40)?;
    check_len("company", &req.company, 120)?;
    Ok(())
}

/// Parses an optional `?status=` filter.
pub(crate) fn status_filter(raw: Option<&str>) -> ApiResult<Option<QuoteStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(ApiError::BadRequest),
        None => Ok(None),
    }
}

/// POST /api/quotes - Submit a quote request to a developer (public)
pub async fn create_quote(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<CreateQuoteRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_create(&payload)?;
    throttle_public_form(&client_ip(&headers, &addr), "quote").await?;

    let pool = db::require_pool()?;

    let profile_id: Uuid = sqlx::query_scalar("SELECT id FROM profiles WHERE slug = $1")
        .bind(payload.profile_slug.trim())
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or(ApiError::NotFound)?;

    let sql = format!(
        r#"
        INSERT INTO quotes (profile_id, name, email, phone, company, project_type,
            budget_range, timeline, description, features)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    );
    let quote = sqlx::query_as::<_, Quote>(&sql)
        .bind(profile_id)
        .bind(payload.name.trim())
        .bind(payload.email.trim().to_lowercase())
        .bind(&payload.phone)
        .bind(&payload.company)
        .bind(payload.project_type.trim())
        .bind(&payload.budget_range)
        .bind(&payload.timeline)
        .bind(payload.description.trim())
        .bind(clean_tags(payload.features))
        .fetch_one(pool.as_ref())
        .await?;

    tracing::info!(quote_id = %quote.id, profile_id = %profile_id, "quote request received");
    Ok((StatusCode::CREATED, Json(quote)))
}

/// GET /api/quotes - Quotes received by the caller
pub async fn list_quotes(
    headers: HeaderMap,
    Query(query): Query<QuoteListQuery>,
) -> ApiResult<Json<Vec<Quote>>> {
    let claims = authenticate(&headers)?;
    let status = status_filter(query.status.as_deref())?;

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM quotes WHERE profile_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at DESC",
        QUOTE_COLUMNS
    );
    let quotes = sqlx::query_as::<_, Quote>(&sql)
        .bind(me.id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(quotes))
}

async fn load_quote(pool: &sqlx::PgPool, id: Uuid) -> ApiResult<Quote> {
    let sql = format!("SELECT {} FROM quotes WHERE id = $1", QUOTE_COLUMNS);
    sqlx::query_as::<_, Quote>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound)
}

/// GET /api/quotes/{id}
pub async fn get_quote(headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<Json<Quote>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let quote = load_quote(pool.as_ref(), id).await?;
    ensure_owner_or_admin(&me, quote.profile_id)?;
    Ok(Json(quote))
}

/// PATCH /api/quotes/{id}/status - Move a quote along the pipeline
pub async fn update_quote_status(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuoteStatusRequest>,
) -> ApiResult<Json<Quote>> {
    let claims = authenticate(&headers)?;
    check_len("note", &payload.note, 2000)?;

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let quote = load_quote(pool.as_ref(), id).await?;
    ensure_owner_or_admin(&me, quote.profile_id)?;

    let from = quote.status();
    check_transition(from, payload.status, payload.quoted_amount_cents)
        .map_err(|e| ApiError::Conflict(e.to_string()))?;

    let amount = if payload.status == QuoteStatus::Quoted {
        payload.quoted_amount_cents
    } else {
        quote.quoted_amount_cents
    };

    // The status guard makes a concurrent transition from the same state lose.
    let sql = format!(
        r#"
        UPDATE quotes SET
            status = $3, quoted_amount_cents = $4, owner_note = COALESCE($5, owner_note),
            status_changed_at = now(), updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    );
    let updated = sqlx::query_as::<_, Quote>(&sql)
        .bind(quote.id)
        .bind(from.as_str())
        .bind(payload.status.as_str())
        .bind(amount)
        .bind(&payload.note)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::Conflict("Quote status changed concurrently".to_string()))?;

    tracing::info!(
        quote_id = %updated.id,
        from = %from,
        to = %payload.status,
        "quote status changed"
    );
    Ok(Json(updated))
}

/// DELETE /api/quotes/{id}
pub async fn delete_quote(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let quote = load_quote(pool.as_ref(), id).await?;
    ensure_owner_or_admin(&me, quote.profile_id)?;

    sqlx::query("DELETE FROM quotes WHERE id = $1")
        .bind(quote.id)
        .execute(pool.as_ref())
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}
