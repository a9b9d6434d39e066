/**
 * Session Helpers
 * Access-token verification, profile lookup and role checks shared by handlers
 */
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::settings;
use crate::db::models::{Profile, PROFILE_COLUMNS};
use crate::error::{ApiError, ApiResult};
use crate::rules::slug::{slugify, SLUG_MAX_LEN, SLUG_MIN_LEN};

/// Claims of an access token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> ApiResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| ApiError::InvalidToken)
    }
}

/// Signs a token the same way the identity provider does. Used by `mint-token`
/// and tests.
pub fn create_access_token(
    user_id: Uuid,
    email: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some(email.to_string()),
        aud: settings().jwt_audience.clone(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings().jwt_secret.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.set_audience(&[settings().jwt_audience.as_str()]);
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings().jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn authenticate(headers: &HeaderMap) -> ApiResult<Claims> {
    let token = extract_bearer_token(headers).ok_or(ApiError::MissingToken)?;
    verify_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected access token");
        ApiError::InvalidToken
    })
}

pub async fn fetch_profile(pool: &PgPool, id: Uuid) -> ApiResult<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
    Ok(sqlx::query_as::<_, Profile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Initial portfolio slug from the local part of an email address.
pub fn profile_slug_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("");
    let base = slugify(local);
    if base.len() < SLUG_MIN_LEN {
        format!("dev-{}", if base.is_empty() { "folio" } else { base.as_str() })
    } else {
        base
    }
}

/// `base-suffix`, with `base` shortened so the result stays within the slug length limit.
fn suffixed_slug(base: &str, suffix: &str) -> String {
    let room = SLUG_MAX_LEN.saturating_sub(suffix.len() + 1);
    let mut head = base[..base.len().min(room)].to_string();
    while head.ends_with('-') {
        head.pop();
    }
    format!("{}-{}", head, suffix)
}

/// Caller's profile, created with defaults on the first authenticated request.
pub async fn load_or_create_profile(pool: &PgPool, claims: &Claims) -> ApiResult<Profile> {
    let id = claims.user_id()?;
    if let Some(profile) = fetch_profile(pool, id).await? {
        return Ok(profile);
    }

    let email = claims.email.clone().unwrap_or_default();
    let base = profile_slug_base(&email);
    let sql = format!(
        "INSERT INTO profiles (id, email, slug) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO NOTHING RETURNING {}",
        PROFILE_COLUMNS
    );

    for attempt in 0..5 {
        let slug = if attempt == 0 {
            base.clone()
        } else {
            let suffix = Alphanumeric
                .sample_string(&mut rand::rng(), 4)
                .to_lowercase();
            suffixed_slug(&base, &suffix)
        };

        match sqlx::query_as::<_, Profile>(&sql)
            .bind(id)
            .bind(&email)
            .bind(&slug)
            .fetch_optional(pool)
            .await
        {
            Ok(Some(profile)) => {
                tracing::info!(profile_id = %id, slug = %slug, "profile created");
                return Ok(profile);
            }
            // Created concurrently by another request for the same user.
            Ok(None) => return fetch_profile(pool, id).await?.ok_or(ApiError::NotFound),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Conflict(
        "Could not allocate a portfolio slug".to_string(),
    ))
}

/// Authenticated caller whose profile has the admin role.
pub async fn require_admin(pool: &PgPool, claims: &Claims) -> ApiResult<Profile> {
    let profile = fetch_profile(pool, claims.user_id()?)
        .await?
        .ok_or_else(|| ApiError::Forbidden("Admin access required".to_string()))?;
    if !profile.is_admin() {
        tracing::warn!(profile_id = %profile.id, "non-admin attempted admin action");
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    Ok(profile)
}

/// Owners act on their own rows; admins act on anyone's. Others get 404 so
/// row ids do not leak.
pub fn ensure_owner_or_admin(actor: &Profile, owner_id: Uuid) -> ApiResult<()> {
    if actor.id == owner_id || actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

#[cfg(test)]
pub(crate) fn test_token(user_id: Uuid) -> String {
    create_access_token(user_id, "dev@example.com", Duration::minutes(5)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let id = Uuid::new_v4();
        let claims = verify_access_token(&test_token(id)).unwrap();
        assert_eq!(claims.user_id().unwrap(), id);
        assert_eq!(claims.email.as_deref(), Some("dev@example.com"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_access_token(Uuid::new_v4(), "a@b.co", Duration::minutes(-10)).unwrap();
        assert!(verify_access_token(&token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            aud: "service_role".to_string(),
            exp: (now + Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(settings().jwt_secret.as_bytes()),
        )
        .unwrap();
        assert!(verify_access_token(&token).is_err());
    }

    #[test]
    fn test_authenticate_header_handling() {
        let mut headers = HeaderMap::new();
        assert!(matches!(authenticate(&headers), Err(ApiError::MissingToken)));

        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(matches!(authenticate(&headers), Err(ApiError::InvalidToken)));

        let token = test_token(Uuid::new_v4());
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(authenticate(&headers).is_ok());
    }

    #[test]
    fn test_non_uuid_subject_is_invalid() {
        let claims = Claims {
            sub: "service".to_string(),
            email: None,
            aud: "authenticated".to_string(),
            exp: 0,
            iat: 0,
        };
        assert!(matches!(claims.user_id(), Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_profile_slug_base() {
        assert_eq!(profile_slug_base("jane.doe@example.com"), "jane-doe");
        assert_eq!(profile_slug_base("jo@example.com"), "dev-jo");
        assert_eq!(profile_slug_base(""), "dev-folio");
    }

    #[test]
    fn test_suffixed_slug_stays_within_limit() {
        assert_eq!(suffixed_slug("jane-doe", "x7k2"), "jane-doe-x7k2");

        let long_base = profile_slug_base(&format!("{}@example.com", "a".repeat(60)));
        assert_eq!(long_base.len(), SLUG_MAX_LEN);
        let slug = suffixed_slug(&long_base, "x7k2");
        assert_eq!(slug.len(), SLUG_MAX_LEN);
        assert!(crate::rules::slug::is_valid_profile_slug(&slug));

        // A cut landing on a hyphen must not leave a double hyphen.
        let hyphenated = format!("{}-bbbb", "a".repeat(34));
        let slug = suffixed_slug(&hyphenated, "x7k2");
        assert_eq!(slug, format!("{}-x7k2", "a".repeat(34)));
        assert!(crate::rules::slug::is_valid_profile_slug(&slug));
    }
}
