/**
 * Admin Routes
 * Back-office statistics, user management and cross-tenant listings
 */
use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::{
    self,
    models::{Profile, Project, Quote, PROFILE_COLUMNS, PROJECT_COLUMNS, QUOTE_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::quotes::status_filter;
use crate::routes::session::{authenticate, require_admin};
use crate::rules::plans::{Plan, Role};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const MAX_PAGE: i64 = 1_000_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub users_by_tier: BTreeMap<String, i64>,
    pub total_projects: i64,
    pub published_projects: i64,
    pub quotes_by_status: BTreeMap<String, i64>,
    pub unread_messages: i64,
    pub active_subscribers: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<Profile>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub subscription_tier: Option<Plan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProjectQuery {
    pub profile_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AdminQuoteQuery {
    pub status: Option<String>,
}

/// `(page, page_size, offset)` with page numbers starting at 1.
fn paging(page: Option<i64>, page_size: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, size, (page - 1) * size)
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(|s| {
        let escaped = s
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

/// GET /api/admin/stats
pub async fn get_stats(headers: HeaderMap) -> ApiResult<Json<AdminStats>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let tiers: Vec<(String, i64)> = sqlx::query_as(
        "SELECT subscription_tier, COUNT(*) FROM profiles GROUP BY subscription_tier",
    )
    .fetch_all(pool.as_ref())
    .await?;
    let quotes: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM quotes GROUP BY status")
            .fetch_all(pool.as_ref())
            .await?;
    let (total_projects, published_projects): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE published) FROM projects",
    )
    .fetch_one(pool.as_ref())
    .await?;
    let (unread_messages,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM contact_messages WHERE status = 'new'")
            .fetch_one(pool.as_ref())
            .await?;
    let (active_subscribers,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM newsletter_subscriptions WHERE status = 'active'",
    )
    .fetch_one(pool.as_ref())
    .await?;

    let users_by_tier: BTreeMap<String, i64> = tiers.into_iter().collect();
    Ok(Json(AdminStats {
        total_users: users_by_tier.values().sum(),
        users_by_tier,
        total_projects,
        published_projects,
        quotes_by_status: quotes.into_iter().collect(),
        unread_messages,
        active_subscribers,
    }))
}

/// GET /api/admin/users
pub async fn list_users(
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<UserPage>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let (page, page_size, offset) = paging(query.page, query.page_size);
    let pattern = search_pattern(query.search.as_deref());

    let filter = "($1::text IS NULL OR email ILIKE $1 OR full_name ILIKE $1 OR slug ILIKE $1)";
    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM profiles WHERE {}", filter))
        .bind(&pattern)
        .fetch_one(pool.as_ref())
        .await?;

    let sql = format!(
        "SELECT {} FROM profiles WHERE {} ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        PROFILE_COLUMNS, filter
    );
    let users = sqlx::query_as::<_, Profile>(&sql)
        .bind(&pattern)
        .bind(page_size)
        .bind(offset)
        .fetch_all(pool.as_ref())
        .await?;

    Ok(Json(UserPage {
        users,
        total,
        page,
        page_size,
    }))
}

/// PATCH /api/admin/users/{id}
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<Profile>> {
    let claims = authenticate(&headers)?;
    if payload.role.is_none() && payload.subscription_tier.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let pool = db::require_pool()?;
    let admin = require_admin(pool.as_ref(), &claims).await?;
    if admin.id == id && payload.role == Some(Role::Developer) {
        return Err(ApiError::bad_request("You cannot remove your own admin role"));
    }

    let sql = format!(
        "UPDATE profiles SET role = COALESCE($2, role), \
         subscription_tier = COALESCE($3, subscription_tier), updated_at = now() \
         WHERE id = $1 RETURNING {}",
        PROFILE_COLUMNS
    );
    let profile = sqlx::query_as::<_, Profile>(&sql)
        .bind(id)
        .bind(payload.role.map(|r| r.as_str()))
        .bind(payload.subscription_tier.map(|p| p.as_str()))
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(
        profile_id = %profile.id,
        updated_by = %admin.id,
        role = %profile.role,
        tier = %profile.subscription_tier,
        "user updated by admin"
    );
    Ok(Json(profile))
}

/// DELETE /api/admin/users/{id} - Removes the profile and everything it owns
pub async fn delete_user(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let admin = require_admin(pool.as_ref(), &claims).await?;

    if admin.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    tracing::warn!(profile_id = %id, deleted_by = %admin.id, "user deleted by admin");
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/admin/projects
pub async fn list_all_projects(
    headers: HeaderMap,
    Query(query): Query<AdminProjectQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM projects WHERE ($1::uuid IS NULL OR profile_id = $1) \
         ORDER BY created_at DESC",
        PROJECT_COLUMNS
    );
    let projects = sqlx::query_as::<_, Project>(&sql)
        .bind(query.profile_id)
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(projects))
}

/// GET /api/admin/quotes
pub async fn list_all_quotes(
    headers: HeaderMap,
    Query(query): Query<AdminQuoteQuery>,
) -> ApiResult<Json<Vec<Quote>>> {
    let claims = authenticate(&headers)?;
    let status = status_filter(query.status.as_deref())?;

    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM quotes WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        QUOTE_COLUMNS
    );
    let quotes = sqlx::query_as::<_, Quote>(&sql)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(quotes))
}
