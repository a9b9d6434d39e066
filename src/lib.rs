//! Devfolio Backend - library for app logic and testing

pub mod billing;
pub mod config;
pub mod db;
pub mod dns;
pub mod error;
pub mod logging;
pub mod routes;
pub mod rules;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::config::settings;
use crate::routes::{admin, domains, messages, newsletter, profiles, projects, promo_codes, quotes};

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Allowed origins from ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN,
/// falling back to SITE_URL.
fn allowed_origins() -> Vec<HeaderValue> {
    let from_list = std::env::var("ALLOWED_ORIGINS").ok().map(|s| {
        s.split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect::<Vec<HeaderValue>>()
    });

    match from_list.filter(|o| !o.is_empty()) {
        Some(origins) => origins,
        None => std::env::var("FRONTEND_ORIGIN")
            .ok()
            .unwrap_or_else(|| settings().site_url.clone())
            .parse::<HeaderValue>()
            .map(|origin| vec![origin])
            .unwrap_or_default(),
    }
}

pub fn configure_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn api_routes() -> Router {
    Router::new()
        // Profile editor and public portfolios
        .route(
            "/api/profile",
            get(profiles::get_my_profile).patch(profiles::update_my_profile),
        )
        .route("/api/portfolios/{slug}", get(profiles::get_portfolio))
        .route(
            "/api/portfolios/{slug}/projects/{project_slug}",
            get(profiles::get_portfolio_project),
        )
        // Projects
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        // Quotes
        .route(
            "/api/quotes",
            get(quotes::list_quotes).post(quotes::create_quote),
        )
        .route(
            "/api/quotes/{id}",
            get(quotes::get_quote).delete(quotes::delete_quote),
        )
        .route("/api/quotes/{id}/status", patch(quotes::update_quote_status))
        // Contact and newsletter
        .route("/api/contact", post(messages::submit_contact))
        .route("/api/newsletter", post(newsletter::subscribe))
        .route("/api/newsletter/unsubscribe", post(newsletter::unsubscribe))
        // Domains
        .route("/api/domains/check", post(domains::check_domain))
        .route(
            "/api/domains",
            get(domains::list_domains).post(domains::create_domain),
        )
        .route("/api/domains/{id}", axum::routing::delete(domains::delete_domain))
        .route("/api/domains/{id}/verify", post(domains::verify_domain))
        .route("/api/domains/{id}/primary", post(domains::set_primary_domain))
        // Promo codes and billing
        .route("/api/promo-codes/validate", post(promo_codes::validate_code))
        .route("/api/billing", get(routes::billing::get_billing))
        .route("/api/billing/portal", post(routes::billing::create_portal))
        .route("/api/checkout", post(routes::billing::create_checkout))
        .route("/api/webhooks/stripe", post(routes::billing::stripe_webhook))
}

fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/stats", get(admin::get_stats))
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/api/admin/projects", get(admin::list_all_projects))
        .route("/api/admin/quotes", get(admin::list_all_quotes))
        .route("/api/admin/messages", get(messages::list_messages))
        .route(
            "/api/admin/messages/{id}",
            patch(messages::update_message).delete(messages::delete_message),
        )
        .route("/api/admin/newsletter", get(newsletter::list_subscribers))
        .route(
            "/api/admin/promo-codes",
            get(promo_codes::list_promo_codes).post(promo_codes::create_promo_code),
        )
        .route(
            "/api/admin/promo-codes/{id}",
            patch(promo_codes::update_promo_code).delete(promo_codes::delete_promo_code),
        )
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    Router::new()
        .merge(api_routes())
        .merge(admin_routes())
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(configure_cors())
}

/// Run the server (used by main).
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Held until the server stops so buffered log lines are flushed.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let settings = settings();
    settings.check_production_secrets()?;

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!(error = %e, "failed to run database migrations");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "database unavailable, continuing without it");
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    if !billing::stripe::client().is_configured() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout and billing portal are disabled");
    }

    let app = create_app();

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    tracing::info!(%addr, environment = %settings.environment, "starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        create_app().layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))))
    }

    #[tokio::test]
    async fn test_health_is_routed() {
        let res = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let res = app()
            .oneshot(Request::get("/api/blog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        for uri in ["/api/profile", "/api/projects", "/api/domains", "/api/admin/stats"] {
            let res = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let body = format!(r#"{{"email":"{}@example.com"}}"#, "a".repeat(BODY_LIMIT_BYTES + 1));
        let res = app()
            .oneshot(
                Request::post("/api/newsletter")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
