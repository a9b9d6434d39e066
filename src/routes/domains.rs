/**
 * Domain Routes
 * DNS detection, custom domain / subdomain management and manual verification
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::settings;
use crate::db::{
    self,
    models::{CustomDomain, Profile, DOMAIN_COLUMNS},
    ONE_PRIMARY_DOMAIN_INDEX,
};
use crate::dns::{
    self,
    probe::{self, DomainDetection, VerificationReport},
    DnsResolver,
};
use crate::error::{ApiError, ApiResult, SuccessResponse};
use crate::routes::session::{authenticate, ensure_owner_or_admin, load_or_create_profile};
use crate::rules::domains::{
    generate_verification_token, is_valid_subdomain_label, status_after_verification,
    verification_record_name, SslStatus,
};

#[derive(Debug, Deserialize)]
pub struct CheckDomainRequest {
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub domain: Option<String>,
    pub subdomain: Option<String>,
}

/// Where the owner has to publish the verification token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsInstructions {
    pub txt_name: String,
    pub txt_value: String,
    pub cname_name: String,
    pub cname_target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponse {
    #[serde(flatten)]
    pub domain: CustomDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<DnsInstructions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub domain: CustomDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<VerificationReport>,
}

fn instructions_for(domain: &CustomDomain) -> Option<DnsInstructions> {
    domain.domain.as_ref().map(|name| DnsInstructions {
        txt_name: verification_record_name(name),
        txt_value: domain.verification_token.clone(),
        cname_name: name.clone(),
        cname_target: settings().platform_cname_target.clone(),
    })
}

impl From<CustomDomain> for DomainResponse {
    fn from(domain: CustomDomain) -> Self {
        Self {
            instructions: instructions_for(&domain),
            domain,
        }
    }
}

/// Requested hostname, either a custom domain or a label under the platform domain.
#[derive(Debug, PartialEq)]
enum DomainTarget {
    Custom(String),
    Subdomain(String),
}

fn parse_target(req: &CreateDomainRequest, platform_domain: &str) -> ApiResult<DomainTarget> {
    match (req.domain.as_deref(), req.subdomain.as_deref()) {
        (Some(domain), None) => {
            let domain = probe::normalize_domain(domain).map_err(ApiError::BadRequest)?;
            if domain == platform_domain || domain.ends_with(&format!(".{}", platform_domain)) {
                return Err(ApiError::bad_request(format!(
                    "Use a subdomain for addresses under {}",
                    platform_domain
                )));
            }
            Ok(DomainTarget::Custom(domain))
        }
        (None, Some(label)) => {
            let label = label.trim().to_lowercase();
            if !is_valid_subdomain_label(&label) {
                return Err(ApiError::bad_request(
                    "Subdomain must be 3-40 lowercase letters, numbers or hyphens and not reserved",
                ));
            }
            Ok(DomainTarget::Subdomain(label))
        }
        _ => Err(ApiError::bad_request(
            "Provide exactly one of 'domain' or 'subdomain'",
        )),
    }
}

async fn check_with<R: DnsResolver + ?Sized>(
    resolver: &R,
    input: &str,
) -> ApiResult<DomainDetection> {
    // Input errors are the caller's; anything after that is the resolver's.
    probe::normalize_domain(input).map_err(ApiError::BadRequest)?;
    probe::detect(resolver, input, &settings().platform_cname_target)
        .await
        .map_err(ApiError::Upstream)
}

fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(ONE_PRIMARY_DOMAIN_INDEX) => "Another domain became primary at the same time, try again",
        _ => "This address is already in use",
    }
}

/// POST /api/domains/check - Registrar and hosting detection (advisory)
pub async fn check_domain(
    headers: HeaderMap,
    Json(payload): Json<CheckDomainRequest>,
) -> ApiResult<Json<DomainDetection>> {
    authenticate(&headers)?;
    Ok(Json(check_with(dns::resolver(), &payload.domain).await?))
}

async fn load_domain(pool: &PgPool, id: Uuid, actor: &Profile) -> ApiResult<CustomDomain> {
    let sql = format!("SELECT {} FROM custom_domains WHERE id = $1", DOMAIN_COLUMNS);
    let domain = sqlx::query_as::<_, CustomDomain>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound)?;
    ensure_owner_or_admin(actor, domain.profile_id)?;
    Ok(domain)
}

/// GET /api/domains
pub async fn list_domains(headers: HeaderMap) -> ApiResult<Json<Vec<DomainResponse>>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    let sql = format!(
        "SELECT {} FROM custom_domains WHERE profile_id = $1 \
         ORDER BY is_primary DESC, created_at ASC",
        DOMAIN_COLUMNS
    );
    let domains = sqlx::query_as::<_, CustomDomain>(&sql)
        .bind(me.id)
        .fetch_all(pool.as_ref())
        .await?;
    Ok(Json(domains.into_iter().map(DomainResponse::from).collect()))
}

/// POST /api/domains
pub async fn create_domain(
    headers: HeaderMap,
    Json(payload): Json<CreateDomainRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = authenticate(&headers)?;
    let target = parse_target(&payload, &settings().platform_domain)?;

    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;

    if matches!(target, DomainTarget::Custom(_)) && !me.plan().allows_custom_domain() {
        return Err(ApiError::Forbidden(
            "Custom domains require the pro or premium plan".to_string(),
        ));
    }

    // Row lock on the profile serializes concurrent adds, so only one can be first.
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
        .bind(me.id)
        .execute(&mut *tx)
        .await?;
    let (has_any,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM custom_domains WHERE profile_id = $1)")
            .bind(me.id)
            .fetch_one(&mut *tx)
            .await?;

    let (domain, subdomain) = match target {
        DomainTarget::Custom(d) => (Some(d), None),
        DomainTarget::Subdomain(s) => (None, Some(s)),
    };

    let sql = format!(
        r#"
        INSERT INTO custom_domains (profile_id, domain, subdomain, slug, is_primary,
            ssl_status, verification_token)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        DOMAIN_COLUMNS
    );
    let created = sqlx::query_as::<_, CustomDomain>(&sql)
        .bind(me.id)
        .bind(&domain)
        .bind(&subdomain)
        .bind(&me.slug)
        .bind(!has_any)
        .bind(SslStatus::Pending.as_str())
        .bind(generate_verification_token())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let constraint = match &e {
                sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
                _ => None,
            };
            match ApiError::from(e) {
                ApiError::Conflict(_) => {
                    ApiError::Conflict(conflict_message(constraint.as_deref()).to_string())
                }
                other => other,
            }
        })?;
    tx.commit().await?;

    tracing::info!(
        domain_id = %created.id,
        profile_id = %me.id,
        custom = created.domain.is_some(),
        "domain added"
    );
    Ok((StatusCode::CREATED, Json(DomainResponse::from(created))))
}

/// POST /api/domains/{id}/verify - Manual DNS verification run
pub async fn verify_domain(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VerifyResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    let domain = load_domain(pool.as_ref(), id, &me).await?;

    let report = match &domain.domain {
        Some(name) => Some(
            probe::verify_ownership(
                dns::resolver(),
                name,
                &domain.verification_token,
                &settings().platform_cname_target,
            )
            .await
            .map_err(|e| ApiError::Upstream(format!("DNS lookup failed: {}", e)))?,
        ),
        // Platform subdomains are served by our own wildcard record.
        None => None,
    };

    let passed = report.as_ref().map(|r| r.passed).unwrap_or(true);
    let status = status_after_verification(domain.ssl_status(), passed);
    let verified_at = if passed {
        domain.verified_at.or(Some(Utc::now()))
    } else {
        domain.verified_at
    };

    let sql = format!(
        "UPDATE custom_domains SET ssl_status = $2, verified_at = $3, last_checked_at = now() \
         WHERE id = $1 RETURNING {}",
        DOMAIN_COLUMNS
    );
    let updated = sqlx::query_as::<_, CustomDomain>(&sql)
        .bind(domain.id)
        .bind(status.as_str())
        .bind(verified_at)
        .fetch_one(pool.as_ref())
        .await?;

    tracing::info!(
        domain_id = %updated.id,
        previous = domain.ssl_status().as_str(),
        status = status.as_str(),
        "domain verification run"
    );
    Ok(Json(VerifyResponse {
        domain: updated,
        report,
    }))
}

/// POST /api/domains/{id}/primary
pub async fn set_primary_domain(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DomainResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    let domain = load_domain(pool.as_ref(), id, &me).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE custom_domains SET is_primary = false WHERE profile_id = $1 AND id <> $2")
        .bind(domain.profile_id)
        .bind(domain.id)
        .execute(&mut *tx)
        .await?;
    let sql = format!(
        "UPDATE custom_domains SET is_primary = true WHERE id = $1 RETURNING {}",
        DOMAIN_COLUMNS
    );
    let updated = sqlx::query_as::<_, CustomDomain>(&sql)
        .bind(domain.id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(DomainResponse::from(updated)))
}

/// DELETE /api/domains/{id} - Removing the primary promotes the oldest remaining one
pub async fn delete_domain(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let claims = authenticate(&headers)?;
    let pool = db::require_pool()?;
    let me = load_or_create_profile(pool.as_ref(), &claims).await?;
    let domain = load_domain(pool.as_ref(), id, &me).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM custom_domains WHERE id = $1")
        .bind(domain.id)
        .execute(&mut *tx)
        .await?;
    if domain.is_primary {
        sqlx::query(
            r#"
            UPDATE custom_domains SET is_primary = true
            WHERE id = (
                SELECT id FROM custom_domains WHERE profile_id = $1
                ORDER BY created_at ASC LIMIT 1
            )
            "#,
        )
        .bind(domain.profile_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(domain_id = %domain.id, deleted_by = %me.id, "domain removed");
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::testing::StaticResolver;
    use crate::dns::RecordType;
    use crate::routes::session::test_token;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn domains_router() -> Router {
        Router::new()
            .route("/api/domains/check", post(check_domain))
            .route("/api/domains", get(list_domains).post(create_domain))
            .route("/api/domains/{id}/verify", post(verify_domain))
    }

    fn req(domain: Option<&str>, subdomain: Option<&str>) -> CreateDomainRequest {
        CreateDomainRequest {
            domain: domain.map(str::to_string),
            subdomain: subdomain.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target(&req(Some("https://Jane.DEV/"), None), "devfolio.app").unwrap(),
            DomainTarget::Custom("jane.dev".into())
        );
        assert_eq!(
            parse_target(&req(None, Some("Jane")), "devfolio.app").unwrap(),
            DomainTarget::Subdomain("jane".into())
        );
        assert!(parse_target(&req(None, None), "devfolio.app").is_err());
        assert!(parse_target(&req(Some("a.dev"), Some("jane")), "devfolio.app").is_err());
        assert!(parse_target(&req(Some("jane.devfolio.app"), None), "devfolio.app").is_err());
        assert!(parse_target(&req(None, Some("www")), "devfolio.app").is_err());
    }

    #[test]
    fn test_instructions_only_for_custom_domains() {
        let now = Utc::now();
        let mut domain = CustomDomain {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            domain: Some("jane.dev".into()),
            subdomain: None,
            slug: "jane".into(),
            is_primary: true,
            ssl_status: "pending".into(),
            verification_token: "devfolio-verify=abc".into(),
            verified_at: None,
            last_checked_at: None,
            created_at: now,
        };
        let instructions = instructions_for(&domain).unwrap();
        assert_eq!(instructions.txt_name, "_devfolio.jane.dev");
        assert_eq!(instructions.txt_value, "devfolio-verify=abc");

        domain.domain = None;
        domain.subdomain = Some("jane".into());
        assert!(instructions_for(&domain).is_none());
    }

    #[tokio::test]
    async fn test_check_with_static_resolver() {
        let resolver = StaticResolver::default()
            .with("jane.dev", RecordType::Ns, &["ada.ns.cloudflare.com."])
            .with("jane.dev", RecordType::A, &["76.76.21.21"]);
        let detection = check_with(&resolver, "jane.dev").await.unwrap();
        assert!(!detection.available);
        assert_eq!(detection.provider.unwrap().id, "cloudflare");
    }

    #[tokio::test]
    async fn test_check_with_bad_input() {
        let resolver = StaticResolver::default();
        assert!(matches!(
            check_with(&resolver, "localhost").await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_conflict_message_names_primary_race() {
        assert_eq!(
            conflict_message(Some(ONE_PRIMARY_DOMAIN_INDEX)),
            "Another domain became primary at the same time, try again"
        );
        assert_eq!(
            conflict_message(Some("custom_domains_domain_key")),
            "This address is already in use"
        );
        assert_eq!(conflict_message(None), "This address is already in use");
    }

    #[tokio::test]
    async fn test_check_route_requires_auth() {
        let res = domains_router()
            .oneshot(
                Request::post("/api/domains/check")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"domain":"jane.dev"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_check_route_rejects_invalid_domain() {
        let res = domains_router()
            .oneshot(
                Request::post("/api/domains/check")
                    .header("authorization", format!("Bearer {}", test_token(Uuid::new_v4())))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"domain":"not a domain"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_requires_exactly_one_target() {
        let res = domains_router()
            .oneshot(
                Request::post("/api/domains")
                    .header("authorization", format!("Bearer {}", test_token(Uuid::new_v4())))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_requires_auth() {
        let res = domains_router()
            .oneshot(
                Request::post(format!("/api/domains/{}/verify", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
