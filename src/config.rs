//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `NATS_URL` - Publish domain events to NATS when set
//! - `DEFAULT_LOCALE` - `el` or `en` (default: el)
//! - `CURRENCY` - ISO 4217 code used for display (default: EUR)

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::domain::value_objects::Locale;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub default_locale: Locale,
    pub currency: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup, used by tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".into()))?;
        let host = parse_or(&get, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&get, "PORT", 8083u16)?;
        let max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10u32)?;
        let default_locale = parse_or(&get, "DEFAULT_LOCALE", Locale::El)?;
        let currency = get("CURRENCY").map_or_else(|| "EUR".to_string(), |c| c.trim().to_uppercase());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidEnvVar("CURRENCY".into(), currency));
        }

        Ok(Self { database_url, host, port, max_connections, nats_url: get("NATS_URL"), default_locale, currency })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/packstore")]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.default_locale, Locale::El);
        assert_eq!(config.currency, "EUR");
        assert!(config.nats_url.is_none());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
    }

    #[test]
    fn test_missing_database_url() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::MissingEnvVar("DATABASE_URL".into()));
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/packstore"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("DEFAULT_LOCALE", "en"),
            ("NATS_URL", "nats://localhost:4222"),
            ("CURRENCY", "eur"),
        ]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.default_locale, Locale::En);
        assert_eq!(config.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.currency, "EUR");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("DATABASE_URL", "x"), ("PORT", "http")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
        assert!(matches!(load(&[("DATABASE_URL", "x"), ("DEFAULT_LOCALE", "fr")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "DEFAULT_LOCALE"));
        assert!(matches!(load(&[("DATABASE_URL", "x"), ("CURRENCY", "EURO")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "CURRENCY"));
    }
}
