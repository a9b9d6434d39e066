/**
 * Project Routes
 * CRUD API endpoints for portfolio projects (owner or admin)
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use rand::distr::{Alphanumeric, SampleString};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    self,
    models::{Profile, Project, PROJECT_COLUMNS},
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::profiles::{check_url, clean_tags};
use crate::routes::session::{authenticate, ensure_owner_or_admin, load_or_create_profile};
use crate::rules::slug::{is_valid_slug, slugify};

/// Request body for POST /api/projects
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: String,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub client_name: Option<String>,
    pub project_url: Option<String>,
    pub repo_url: Option<String>,
    pub year: Option<i32>,
    pub published: Option<bool>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Request body for PATCH /api/projects/{id}
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub client_name: Option<String>,
    pub project_url: Option<String>,
    pub repo_url: Option<String>,
    pub year: Option<i32>,
    pub published: Option<bool>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
}

fn check_year(year: Option<i32>) -> ApiResult<()> {
    match year {
        Some(y) if !(1990..=2100).contains(&y) => {
            Err(ApiError::bad_request("Year must be between 1990 and 2100"))
        }
        _ => Ok(()),
    }
}

/// Resolves and checks the slug for a new project.
fn project_slug(title: &str, slug: Option<&str>) -> ApiResult<String> {
    let slug = match slug {
        Some(s) => s.to_string(),
        None => {
            let derived = slugify(title);
            if derived.is_empty() {
                // Titles with no ASCII letters or digits get a generated slug.
                format!(
                    "project-{}",
                    Alphanumeric
                        .sample_string(&mut rand::rng(), 6)
                        .to_lowercase()
                )
            } else {
                derived
            }
        }
    };
    if !is_valid_slug(&slug) {
        return Err(ApiError::bad_request(
            "Slug must contain only lowercase letters, numbers, and hyphens",
        ));
    }
    Ok(slug)
}

fn validate_create(req: &CreateProjectRequest) -> ApiResult<String> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    check_url("imageUrl", &req.image_url)?;
    check_url("projectUrl", &req.project_url)?;
    check_url("repoUrl", &req.repo_url)?;
    check_year(req.year)?;
    project_slug(&req.title, req.slug.as_deref())
}

fn validate_update(req: &UpdateProjectRequest) -> ApiResult<()> {
    if matches!(&req.title, Some(t) if t.trim().is_empty()) {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    if let Some(slug) = &req.slug {
        if !is_valid_slug(slug) {
            return Err(ApiError::bad_request(
                "Slug must contain only lowercase letters, numbers, and hyphens",
            ));
        }
    }
    check_url("imageUrl", &req.image_url)?;
    check_url("projectUrl", &req.project_url)?;
    check_url("repoUrl", &req.repo_url)?;
    check_year(req.year)
}

async fn load_project(pool: &sqlx::PgPool, id: Uuid, actor: &Profile) -> ApiResult<Project> {
    let sql = format!("SELECT {} FROM projects WHERE id = $1", PROJECT_COLUMNS);
    let project = sqlx::query_as::<_, Project>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound)?;
    ensure_owner_or_admin(actor, project.profile_id)?;
    Ok(project)
}

fn slug_conflict(e: sqlx::Error) -> ApiError {
    match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::Conflict("A project with this slug already exists".to_string())
        }
        other => other,
    }
}

/// GET /api/projects - Caller's projects, drafts included
pub async fn list_projects(headers: HeaderMap) -> ApiResult<Json<Vec<Project>>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM projects WHERE profile_id = $1 ORDER BY sort_order ASC, created_at DESC",
        PROJECT_COLUMNS
    );
    let projects = sqlx::query_as::<_, Project>(&sql)
        .bind(me.id)
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(projects))
}

/// POST /api/projects - Create a project within the plan's project allowance
pub async fn create_project(
    headers: HeaderMap,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = authenticate(&headers)?;
    let slug = validate_create(&payload)?;

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    if let Some(limit) = me.plan().project_limit() {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects WHERE profile_id = $1")
            .bind(me.id)
            .fetch_one(pool.as_ref())
            .await?;
        if count >= limit {
            return Err(ApiError::Forbidden(format!(
                "The {} plan allows {} projects. Upgrade to add more.",
                me.plan(),
                limit
            )));
        }
    }

    let sql = format!(
        r#"
        INSERT INTO projects (profile_id, title, slug, category, description, content, image_url,
            technologies, client_name, project_url, repo_url, year, published, featured, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    );
    let project = sqlx::query_as::<_, Project>(&sql)
        .bind(me.id)
        .bind(payload.title.trim())
        .bind(&slug)
        .bind(&payload.category)
        .bind(&payload.description)
        .bind(&payload.content)
        .bind(&payload.image_url)
        .bind(clean_tags(payload.technologies.clone()))
        .bind(&payload.client_name)
        .bind(&payload.project_url)
        .bind(&payload.repo_url)
        .bind(payload.year)
        .bind(payload.published.unwrap_or(false))
        .bind(payload.featured.unwrap_or(false))
        .bind(payload.sort_order.unwrap_or(0))
        .fetch_one(pool.as_ref())
        .await
        .map_err(slug_conflict)?;

    tracing::info!(project_id = %project.id, profile_id = %me.id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/{id}
pub async fn get_project(headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<Json<Project>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    Ok(Json(load_project(pool.as_ref(), id, &me).await?))
}

/// PATCH /api/projects/{id}
pub async fn update_project(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let claims = authenticate(&headers)?;
    validate_update(&payload)?;

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    let existing = load_project(pool.as_ref(), id, &me).await?;

    let sql = format!(
        r#"
        UPDATE projects SET
            title = $2, slug = $3, category = $4, description = $5, content = $6,
            image_url = $7, technologies = $8, client_name = $9, project_url = $10,
            repo_url = $11, year = $12, published = $13, featured = $14, sort_order = $15,
            updated_at = now()
        WHERE id = $1
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    );
    let project = sqlx::query_as::<_, Project>(&sql)
        .bind(existing.id)
        .bind(payload.title.map(|t| t.trim().to_string()).unwrap_or(existing.title))
        .bind(payload.slug.unwrap_or(existing.slug))
        .bind(payload.category.or(existing.category))
        .bind(payload.description.or(existing.description))
        .bind(payload.content.or(existing.content))
        .bind(payload.image_url.or(existing.image_url))
        .bind(
            payload
                .technologies
                .map(clean_tags)
                .unwrap_or(existing.technologies),
        )
        .bind(payload.client_name.or(existing.client_name))
        .bind(payload.project_url.or(existing.project_url))
        .bind(payload.repo_url.or(existing.repo_url))
        .bind(payload.year.or(existing.year))
        .bind(payload.published.unwrap_or(existing.published))
        .bind(payload.featured.unwrap_or(existing.featured))
        .bind(payload.sort_order.unwrap_or(existing.sort_order))
        .fetch_one(pool.as_ref())
        .await
        .map_err(slug_conflict)?;

    Ok(Json(project))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    let project = load_project(pool.as_ref(), id, &me).await?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project.id)
        .execute(pool.as_ref())
        .await?;

    tracing::info!(project_id = %project.id, deleted_by = %me.id, "project deleted");
    Ok(Json(SuccessResponse { success: true }))
}
