/**
 * Health Routes
 * Liveness, readiness and dependency checks
 */
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::settings;

lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Pin the uptime origin to process start.
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Single dependency check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub database: ServiceCheck,
    pub payments: ServiceCheck,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub environment: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn database_check() -> ServiceCheck {
    match crate::db::health_check().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => ServiceCheck {
            status: "unhealthy".to_string(),
            response_time: None,
            error: Some(e.to_string()),
        },
    }
}

/// Payments are configured or not; the provider itself is not called.
fn payments_check() -> ServiceCheck {
    if crate::billing::stripe::client().is_configured() {
        ServiceCheck {
            status: "configured".to_string(),
            response_time: None,
            error: None,
        }
    } else {
        ServiceCheck {
            status: "disabled".to_string(),
            response_time: None,
            error: Some("STRIPE_SECRET_KEY not set".to_string()),
        }
    }
}

/// GET /health - Liveness ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed
pub async fn health_detailed() -> impl IntoResponse {
    let response = DetailedHealthResponse {
        // The process answers even when dependencies are down.
        status: "ok".to_string(),
        environment: settings().environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        checks: HealthChecks {
            database: database_check().await,
            payments: payments_check(),
        },
    };

    (StatusCode::OK, Json(response))
}

/// GET /health/database
pub async fn health_database() -> impl IntoResponse {
    let check = database_check().await;
    let status = if check.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(check))
}

/// GET /health/ready - Ready only once the database answers
pub async fn health_ready() -> impl IntoResponse {
    let db_ok = crate::db::health_check().await.is_ok();

    let response = ReadyResponse {
        status: if db_ok { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        database: if db_ok { "healthy" } else { "unhealthy" }.to_string(),
        reason: (!db_ok).then(|| "Database is not reachable".to_string()),
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router() -> Router {
        Router::new()
            .route("/health", get(health_ping))
            .route("/health/detailed", get(health_detailed))
            .route("/health/database", get(health_database))
            .route("/health/ready", get(health_ready))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, T) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value: T = serde_json::from_slice(&body).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let (status, body) = get_json::<SimpleHealthResponse>(test_router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_database_unavailable_without_pool() {
        let (status, body) = get_json::<ServiceCheck>(test_router(), "/health/database").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert!(body.error.is_some());
    }

    #[tokio::test]
    async fn test_health_detailed_reports_checks() {
        init_start_time();
        let (status, body) =
            get_json::<DetailedHealthResponse>(test_router(), "/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.database.status, "unhealthy");
        assert!(!body.version.is_empty());
    }

    #[tokio::test]
    async fn test_health_ready_needs_database() {
        let (status, body) = get_json::<ReadyResponse>(test_router(), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "not ready");
        assert!(body.reason.is_some());
    }
}
