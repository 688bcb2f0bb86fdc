//! Service configuration, read from the environment (and `.env`).

use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    /// `None` runs against the in-process mock gateway.
    pub gateway: Option<GatewayConfig>,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub app_base_url: String,
    pub currency: String,
    pub json_logs: bool,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid { name, reason: e.to_string() }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = parsed("PORT", 8083u16)?;
        let gateway = match (optional("PAYMENT_GATEWAY_URL"), optional("PAYMENT_GATEWAY_SECRET_KEY")) {
            (Some(base_url), Some(secret_key)) => Some(GatewayConfig {
                base_url,
                secret_key,
                timeout: Duration::from_secs(parsed("PAYMENT_GATEWAY_TIMEOUT_SECS", 15u64)?),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Incomplete("PAYMENT_GATEWAY_URL", "PAYMENT_GATEWAY_SECRET_KEY")),
            (None, Some(_)) => return Err(ConfigError::Incomplete("PAYMENT_GATEWAY_SECRET_KEY", "PAYMENT_GATEWAY_URL")),
        };
        let currency = optional("STORE_CURRENCY").unwrap_or_else(|| "PHP".to_string()).to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid { name: "STORE_CURRENCY", reason: format!("'{currency}' is not an ISO 4217 code") });
        }

        let config = Self {
            port,
            database_url: optional("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10u32)?,
            nats_url: optional("NATS_URL"),
            gateway,
            webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            webhook_tolerance_secs: parsed("PAYMENT_WEBHOOK_TOLERANCE_SECS", 300u64)?,
            app_base_url: optional("APP_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}"))
                .trim_end_matches('/')
                .to_string(),
            currency,
            json_logs: optional("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        };
        config.check_webhook_secret()?;
        Ok(config)
    }

    /// Unsigned webhooks are only acceptable against the mock gateway; a real
    /// provider's completions must be verifiable.
    pub fn check_webhook_secret(&self) -> Result<(), ConfigError> {
        if self.gateway.is_some() && self.webhook_secret.is_none() {
            return Err(ConfigError::Incomplete("PAYMENT_GATEWAY_URL", "PAYMENT_WEBHOOK_SECRET"));
        }
        Ok(())
    }

    pub fn success_url(&self) -> String { format!("{}/checkout/success", self.app_base_url) }
    pub fn cancel_url(&self) -> String { format!("{}/checkout/cancel", self.app_base_url) }
}
