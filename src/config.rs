//! Process-wide settings read from the environment.

use once_cell::sync::Lazy;

/// Secret used when `JWT_SECRET` is missing. Refused in production.
pub const DEFAULT_JWT_SECRET: &str = "dev-jwt-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub site_url: String,
    /// Root zone that hosts `<subdomain>.<platform_domain>` portfolios.
    pub platform_domain: String,
    /// Target a custom domain must CNAME to before it can be verified.
    pub platform_cname_target: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub billing_currency: String,
    pub doh_endpoint: String,
    pub outbound_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            environment: env_or("ENVIRONMENT", "development"),
            host: env_or("HOST", "127.0.0.1"),
            port: env_parse("PORT", 3001),
            site_url: env_or("SITE_URL", "http://localhost:3000"),
            platform_domain: env_or("PLATFORM_DOMAIN", "devfolio.app"),
            platform_cname_target: env_or("PLATFORM_CNAME_TARGET", "sites.devfolio.app"),
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            jwt_audience: env_or("JWT_AUDIENCE", "authenticated"),
            stripe_secret_key: env_or("STRIPE_SECRET_KEY", ""),
            stripe_webhook_secret: env_or("STRIPE_WEBHOOK_SECRET", ""),
            stripe_api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com"),
            billing_currency: env_or("BILLING_CURRENCY", "eur").to_lowercase(),
            doh_endpoint: env_or("DOH_ENDPOINT", "https://cloudflare-dns.com/dns-query"),
            outbound_timeout_secs: env_parse("OUTBOUND_TIMEOUT_SECS", 8),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Startup checks that must hold before serving traffic.
    pub fn check_production_secrets(&self) -> Result<(), String> {
        if !self.is_production() {
            return Ok(());
        }
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            return Err("JWT_SECRET must be set to the BaaS signing secret in production".into());
        }
        if self.stripe_webhook_secret.is_empty() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET is not set; billing webhooks will be rejected");
        }
        Ok(())
    }
}

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

pub fn settings() -> &'static Settings {
    &SETTINGS
}
