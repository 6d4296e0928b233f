use chrono::Duration;
use std::fmt;
use thiserror::Error;
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "your-default-secret-key-change-in-production";
const DEFAULT_ACCESS_TOKEN_LIFETIME: &str = "24h";
const DEFAULT_REFRESH_TOKEN_LIFETIME: &str = "7d";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration for {key}: {value:?} (expected e.g. \"90s\", \"15m\", \"24h\", \"7d\")")]
    InvalidDuration { key: &'static str, value: String },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Secret and lifetimes used to mint and verify session tokens
#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: impl Into<String>,
        access_token_lifetime: Duration,
        refresh_token_lifetime: Duration,
    ) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_lifetime,
            refresh_token_lifetime,
        }
    }

    /// Reads `JWT_SECRET`, `JWT_EXPIRES_IN` and `JWT_REFRESH_EXPIRES_IN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET is not set, falling back to the development secret");
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            jwt_secret,
            access_token_lifetime: lifetime_from_env("JWT_EXPIRES_IN", DEFAULT_ACCESS_TOKEN_LIFETIME)?,
            refresh_token_lifetime: lifetime_from_env(
                "JWT_REFRESH_EXPIRES_IN",
                DEFAULT_REFRESH_TOKEN_LIFETIME,
            )?,
        })
    }

    pub fn secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration assembled from the process environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Postgres connection string; the in-memory user store is used when unset
    pub database_url: Option<String>,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "PORT", value })?,
            Err(_) => 3000,
        };
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        Ok(Self {
            server: ServerConfig { host, port },
            database_url,
            auth: AuthConfig::from_env()?,
        })
    }
}

fn lifetime_from_env(key: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    configured_lifetime(key, value)
}

/// A deployed lifetime must be positive, or every token would be born expired
fn configured_lifetime(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    match parse_lifetime(&value) {
        Some(lifetime) if lifetime > Duration::zero() => Ok(lifetime),
        _ => Err(ConfigError::InvalidDuration { key, value }),
    }
}

/// Parses lifetimes such as `"24h"`, `"7d"`, `"15m"`, `"90s"` or a bare number of seconds
pub fn parse_lifetime(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (amount, unit) = match value.char_indices().last() {
        Some((idx, unit)) if unit.is_ascii_alphabetic() => (&value[..idx], Some(unit)),
        Some(_) => (value, None),
        None => return None,
    };
    let amount: i64 = amount.trim().parse().ok()?;

    match unit.map(|u| u.to_ascii_lowercase()) {
        None | Some('s') => Duration::try_seconds(amount),
        Some('m') => Duration::try_minutes(amount),
        Some('h') => Duration::try_hours(amount),
        Some('d') => Duration::try_days(amount),
        Some(_) => None,
    }
}
