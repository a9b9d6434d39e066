/**
 * Promo Code Routes
 * Public code check with price preview, and admin code management
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{
    self,
    models::{PromoCode, PROMO_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::session::{authenticate, require_admin};
use crate::rules::plans::{BillingCycle, Plan};
use crate::rules::promo::{
    apply_discount, normalize_code, validate_definition, validate_promo, Discount,
    DiscountType, PriceBreakdown,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    pub code: String,
    pub plan: Plan,
    pub billing_cycle: Option<BillingCycle>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Discount>,
    pub pricing: PriceBreakdown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    #[serde(default)]
    pub applicable_plans: Vec<Plan>,
    pub is_active: Option<bool>,
}

/// Nullable PATCH fields: absent is `None`, an explicit `null` is `Some(None)`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromoRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_uses: Option<Option<i32>>,
    pub applicable_plans: Option<Vec<Plan>>,
    pub is_active: Option<bool>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Patched value for a nullable column; absent keeps the stored value.
fn merge_nullable<T>(patch: Option<Option<T>>, existing: Option<T>) -> Option<T> {
    patch.unwrap_or(existing)
}

fn plan_names(plans: &[Plan]) -> Vec<String> {
    let mut names: Vec<String> = plans.iter().map(|p| p.as_str().to_string()).collect();
    names.sort();
    names.dedup();
    names
}

/// Case-insensitive lookup by code.
pub(crate) async fn find_promo(pool: &PgPool, code: &str) -> ApiResult<Option<PromoCode>> {
    let sql = format!("SELECT {} FROM promo_codes WHERE code = $1", PROMO_COLUMNS);
    Ok(sqlx::query_as::<_, PromoCode>(&sql)
        .bind(normalize_code(code))
        .fetch_optional(pool)
        .await?)
}

/// POST /api/promo-codes/validate
///
/// Refusals are reported in the body with `valid: false`; no use is reserved.
pub async fn validate_code(
    Json(payload): Json<ValidatePromoRequest>,
) -> ApiResult<Json<ValidatePromoResponse>> {
    if payload.code.trim().is_empty() {
        return Err(ApiError::bad_request("Promo code is required"));
    }
    let cycle = payload.billing_cycle.unwrap_or(BillingCycle::Monthly);
    let price = payload.plan.price_cents(cycle);

    let pool = db::require_pool()?;
    let promo = find_promo(pool.as_ref(), &payload.code).await?;

    let response = match validate_promo(promo.as_ref(), payload.plan, Utc::now()) {
        Ok(discount) => ValidatePromoResponse {
            valid: true,
            message: None,
            discount: Some(discount),
            pricing: apply_discount(Some(&discount), price),
        },
        Err(rejection) => {
            tracing::debug!(code = %normalize_code(&payload.code), reason = ?rejection, "promo code refused");
            ValidatePromoResponse {
                valid: false,
                message: Some(rejection.message()),
                discount: None,
                pricing: apply_discount(None, price),
            }
        }
    };
    Ok(Json(response))
}

/// GET /api/admin/promo-codes
pub async fn list_promo_codes(headers: HeaderMap) -> ApiResult<Json<Vec<PromoCode>>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!("SELECT {} FROM promo_codes ORDER BY created_at DESC", PROMO_COLUMNS);
    let codes = sqlx::query_as::<_, PromoCode>(&sql)
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(codes))
}

/// POST /api/admin/promo-codes
pub async fn create_promo_code(
    headers: HeaderMap,
    Json(payload): Json<CreatePromoRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = authenticate(&headers)?;
    let valid_from = payload.valid_from.unwrap_or_else(Utc::now);
    validate_definition(
        &payload.code,
        payload.discount_type,
        payload.discount_value,
        valid_from,
        payload.valid_until,
        payload.max_uses,
    )
    .map_err(ApiError::BadRequest)?;

    let pool = db::require_pool()?;
    let admin = require_admin(pool.as_ref(), &claims).await?;

    let sql = format!(
        r#"
        INSERT INTO promo_codes (code, description, discount_type, discount_value, valid_from,
            valid_until, max_uses, applicable_plans, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        PROMO_COLUMNS
    );
    let promo = sqlx::query_as::<_, PromoCode>(&sql)
        .bind(normalize_code(&payload.code))
        .bind(&payload.description)
        .bind(payload.discount_type.as_str())
        .bind(payload.discount_value)
        .bind(valid_from)
        .bind(payload.valid_until)
        .bind(payload.max_uses)
        .bind(plan_names(&payload.applicable_plans))
        .bind(payload.is_active.unwrap_or(true))
        .fetch_one(pool.as_ref())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Promo code already exists".to_string()),
            other => other,
        })?;

    tracing::info!(code = %promo.code, created_by = %admin.id, "promo code created");
    Ok((StatusCode::CREATED, Json(promo)))
}

/// PATCH /api/admin/promo-codes/{id}
pub async fn update_promo_code(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePromoRequest>,
) -> ApiResult<Json<PromoCode>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let sql = format!("SELECT {} FROM promo_codes WHERE id = $1", PROMO_COLUMNS);
    let existing = sqlx::query_as::<_, PromoCode>(&sql)
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or(ApiError::NotFound)?;

    let discount_type = match payload.discount_type {
        Some(t) => t,
        None => existing
            .discount_type
            .parse::<DiscountType>()
            .map_err(ApiError::Internal)?,
    };
    let discount_value = payload.discount_value.unwrap_or(existing.discount_value);
    let valid_from = payload.valid_from.unwrap_or(existing.valid_from);
    let valid_until = merge_nullable(payload.valid_until, existing.valid_until);
    let max_uses = merge_nullable(payload.max_uses, existing.max_uses);

    validate_definition(
        &existing.code,
        discount_type,
        discount_value,
        valid_from,
        valid_until,
        max_uses,
    )
    .map_err(ApiError::BadRequest)?;

    let sql = format!(
        r#"
        UPDATE promo_codes SET
            description = $2, discount_type = $3, discount_value = $4, valid_from = $5,
            valid_until = $6, max_uses = $7, applicable_plans = $8, is_active = $9,
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        PROMO_COLUMNS
    );
    let promo = sqlx::query_as::<_, PromoCode>(&sql)
        .bind(existing.id)
        .bind(merge_nullable(payload.description, existing.description))
        .bind(discount_type.as_str())
        .bind(discount_value)
        .bind(valid_from)
        .bind(valid_until)
        .bind(max_uses)
        .bind(
            payload
                .applicable_plans
                .map(|plans| plan_names(&plans))
                .unwrap_or(existing.applicable_plans),
        )
        .bind(payload.is_active.unwrap_or(existing.is_active))
        .fetch_one(pool.as_ref())
        .await?;
    Ok(Json(promo))
}

/// DELETE /api/admin/promo-codes/{id}
pub async fn delete_promo_code(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    require_admin(pool.as_ref(), &claims).await?;

    let result = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(Json(SuccessResponse { success: true }))
}
