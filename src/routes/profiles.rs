/**
 * Profile Routes
 * Portfolio content editor and public portfolio pages
 */
use axum::{extract::Path, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{
    self,
    models::{Profile, Project, PROFILE_COLUMNS, PROJECT_COLUMNS},
};
use crate::error::{ApiError, ApiResult};
use crate::routes::session::{authenticate, load_or_create_profile};
use crate::rules::slug::{is_valid_profile_slug, is_valid_slug};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for PATCH /api/profile. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub slug: Option<String>,
    pub headline: Option<String>,
    pub hero_subtitle: Option<String>,
    pub about: Option<String>,
    pub cta_text: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub available_for_work: Option<bool>,
    pub technologies: Option<Vec<String>>,
    pub stats: Option<Value>,
    pub services: Option<Value>,
    pub process_steps: Option<Value>,
}

/// Profile fields safe to show on a public page
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub slug: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub hero_subtitle: Option<String>,
    pub about: Option<String>,
    pub cta_text: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub available_for_work: bool,
    pub technologies: Vec<String>,
    pub stats: Value,
    pub services: Value,
    pub process_steps: Value,
}

impl From<Profile> for PublicProfile {
    fn from(p: Profile) -> Self {
        Self {
            slug: p.slug,
            full_name: p.full_name,
            headline: p.headline,
            hero_subtitle: p.hero_subtitle,
            about: p.about,
            cta_text: p.cta_text,
            avatar_url: p.avatar_url,
            location: p.location,
            website_url: p.website_url,
            github_url: p.github_url,
            linkedin_url: p.linkedin_url,
            available_for_work: p.available_for_work,
            technologies: p.technologies,
            stats: p.stats,
            services: p.services,
            process_steps: p.process_steps,
        }
    }
}

/// Response for GET /api/portfolios/{slug}
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResponse {
    pub profile: PublicProfile,
    pub projects: Vec<Project>,
}

// ============================================================================
// Validation
// ============================================================================

const MAX_SHORT_TEXT: usize = 160;
const MAX_LONG_TEXT: usize = 5_000;
const MAX_TECHNOLOGIES: usize = 50;
const MAX_LIST_ITEMS: usize = 20;

pub(crate) fn check_len(field: &str, value: &Option<String>, max: usize) -> ApiResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::bad_request(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_url(field: &str, value: &Option<String>) -> ApiResult<()> {
    match value {
        Some(v) if !v.is_empty() && !(v.starts_with("https://") || v.starts_with("http://")) => {
            Err(ApiError::bad_request(format!("{} must be an http(s) URL", field)))
        }
        _ => Ok(()),
    }
}

fn check_list(field: &str, value: &Option<Value>) -> ApiResult<()> {
    match value {
        Some(Value::Array(items)) if items.len() > MAX_LIST_ITEMS => Err(ApiError::bad_request(
            format!("{} may hold at most {} entries", field, MAX_LIST_ITEMS),
        )),
        Some(Value::Array(_)) | None => Ok(()),
        Some(_) => Err(ApiError::bad_request(format!("{} must be a list", field))),
    }
}

/// Trimmed, de-duplicated (case-insensitive) tag list.
pub(crate) fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            out.push(tag);
        }
    }
    out
}

fn validate_update(req: &UpdateProfileRequest) -> ApiResult<()> {
    if let Some(slug) = &req.slug {
        if !is_valid_profile_slug(slug) {
            return Err(ApiError::bad_request(
                "Slug must be 3-40 lowercase letters, numbers, and hyphens",
            ));
        }
    }
    check_len("fullName", &req.full_name, MAX_SHORT_TEXT)?;
    check_len("headline", &req.headline, MAX_SHORT_TEXT)?;
    check_len("heroSubtitle", &req.hero_subtitle, MAX_SHORT_TEXT * 2)?;
    check_len("ctaText", &req.cta_text, MAX_SHORT_TEXT)?;
    check_len("location", &req.location, MAX_SHORT_TEXT)?;
    check_len("about", &req.about, MAX_LONG_TEXT)?;
    check_url("avatarUrl", &req.avatar_url)?;
    check_url("websiteUrl", &req.website_url)?;
    check_url("githubUrl", &req.github_url)?;
    check_url("linkedinUrl", &req.linkedin_url)?;
    check_list("stats", &req.stats)?;
    check_list("services", &req.services)?;
    check_list("processSteps", &req.process_steps)?;
    if let Some(tech) = &req.technologies {
        if tech.len() > MAX_TECHNOLOGIES {
            return Err(ApiError::bad_request(format!(
                "technologies may hold at most {} entries",
                MAX_TECHNOLOGIES
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/profile - Caller's profile (created on first call)
pub async fn get_my_profile(headers: HeaderMap) -> ApiResult<Json<Profile>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let profile = load_or_create_profile(pool.as_ref(), &claims).await?;
    Ok(Json(profile))
}

/// PATCH /api/profile - Portfolio content editor
pub async fn update_my_profile(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let claims = authenticate(&headers)?;
    validate_update(&payload)?;

    let pool = db::require_pool()?;
    let existing = load_or_create_profile(pool.as_ref(), &claims).await?;

    let sql = format!(
        r#"
        UPDATE profiles SET
            full_name = $2, slug = $3, headline = $4, hero_subtitle = $5, about = $6,
            cta_text = $7, avatar_url = $8, location = $9, website_url = $10,
            github_url = $11, linkedin_url = $12, available_for_work = $13,
            technologies = $14, stats = $15, services = $16, process_steps = $17,
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    );

    let technologies = payload
        .technologies
        .map(clean_tags)
        .unwrap_or(existing.technologies);

    let updated = sqlx::query_as::<_, Profile>(&sql)
        .bind(existing.id)
        .bind(payload.full_name.or(existing.full_name))
        .bind(payload.slug.unwrap_or(existing.slug))
        .bind(payload.headline.or(existing.headline))
        .bind(payload.hero_subtitle.or(existing.hero_subtitle))
        .bind(payload.about.or(existing.about))
        .bind(payload.cta_text.or(existing.cta_text))
        .bind(payload.avatar_url.or(existing.avatar_url))
        .bind(payload.location.or(existing.location))
        .bind(payload.website_url.or(existing.website_url))
        .bind(payload.github_url.or(existing.github_url))
        .bind(payload.linkedin_url.or(existing.linkedin_url))
        .bind(payload.available_for_work.unwrap_or(existing.available_for_work))
        .bind(technologies)
        .bind(payload.stats.unwrap_or(existing.stats))
        .bind(payload.services.unwrap_or(existing.services))
        .bind(payload.process_steps.unwrap_or(existing.process_steps))
        .fetch_one(pool.as_ref())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Slug already taken".to_string()),
            other => other,
        })?;

    tracing::info!(profile_id = %updated.id, "profile content updated");
    Ok(Json(updated))
}

async fn profile_by_slug(pool: &sqlx::PgPool, slug: &str) -> ApiResult<Profile> {
    if !is_valid_slug(slug) {
        return Err(ApiError::NotFound);
    }
    let sql = format!("SELECT {} FROM profiles WHERE slug = $1", PROFILE_COLUMNS);
    sqlx::query_as::<_, Profile>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound)
}

/// GET /api/portfolios/{slug} - Public portfolio with published projects
pub async fn get_portfolio(Path(slug): Path<String>) -> ApiResult<Json<PortfolioResponse>> {
    let pool = db::require_pool()?;
    let profile = profile_by_slug(pool.as_ref(), &slug).await?;

    let sql = format!(
        "SELECT {} FROM projects WHERE profile_id = $1 AND published = true \
         ORDER BY featured DESC, sort_order ASC, created_at DESC",
        PROJECT_COLUMNS
    );
    let projects = sqlx::query_as::<_, Project>(&sql)
        .bind(profile.id)
        .fetch_all(pool.as_ref())
        .await?;

    Ok(Json(PortfolioResponse {
        profile: profile.into(),
        projects,
    }))
}

/// GET /api/portfolios/{slug}/projects/{project_slug} - One published project
pub async fn get_portfolio_project(
    Path((slug, project_slug)): Path<(String, String)>,
) -> ApiResult<Json<Project>> {
    if !is_valid_slug(&project_slug) {
        return Err(ApiError::NotFound);
    }
    let pool = db::require_pool()?;
    let profile = profile_by_slug(pool.as_ref(), &slug).await?;

    let sql = format!(
        "SELECT {} FROM projects WHERE profile_id = $1 AND slug = $2 AND published = true",
        PROJECT_COLUMNS
    );
    sqlx::query_as::<_, Project>(&sql)
        .bind(profile.id)
        .bind(&project_slug)
        .fetch_optional(pool.as_ref())
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::session::test_token;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn profile_router() -> Router {
        Router::new()
            .route("/api/profile", get(get_my_profile).patch(update_my_profile))
            .route("/api/portfolios/{slug}", get(get_portfolio))
            .route(
                "/api/portfolios/{slug}/projects/{project_slug}",
                get(get_portfolio_project),
            )
    }

    async fn send(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.unwrap().status()
    }

    #[test]
    fn test_validate_update_rules() {
        assert!(validate_update(&UpdateProfileRequest::default()).is_ok());

        let bad_slug = UpdateProfileRequest {
            slug: Some("Not Valid".into()),
            ..Default::default()
        };
        assert!(validate_update(&bad_slug).is_err());

        let bad_url = UpdateProfileRequest {
            github_url: Some("github.com/jane".into()),
            ..Default::default()
        };
        assert!(validate_update(&bad_url).is_err());

        let bad_stats = UpdateProfileRequest {
            stats: Some(serde_json::json!({ "years": 5 })),
            ..Default::default()
        };
        assert!(validate_update(&bad_stats).is_err());

        let ok = UpdateProfileRequest {
            slug: Some("jane-doe".into()),
            stats: Some(serde_json::json!([{ "label": "Years", "value": "8+" }])),
            website_url: Some("https://jane.dev".into()),
            ..Default::default()
        };
        assert!(validate_update(&ok).is_ok());
    }

    #[test]
    fn test_clean_tags() {
        let tags = clean_tags(vec![
            " Rust ".into(),
            "rust".into(),
            "".into(),
            "PostgreSQL".into(),
        ]);
        assert_eq!(tags, vec!["Rust", "PostgreSQL"]);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let req = Request::get("/api/profile").body(Body::empty()).unwrap();
        assert_eq!(send(profile_router(), req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_without_database_is_unavailable() {
        let req = Request::get("/api/profile")
            .header("authorization", format!("Bearer {}", test_token(Uuid::new_v4())))
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            send(profile_router(), req).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_patch_validates_before_database() {
        let req = Request::patch("/api/profile")
            .header("authorization", format!("Bearer {}", test_token(Uuid::new_v4())))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"slug":"x"}"#))
            .unwrap();
        assert_eq!(send(profile_router(), req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_portfolio_without_database() {
        let req = Request::get("/api/portfolios/jane-doe")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            send(profile_router(), req).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
