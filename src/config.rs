use std::time::Duration;

use anyhow::{Context, Result};

use crate::ingest::IngestConfig;

const DEFAULT_QUERY_SERVICE_URL: &str = "http://localhost:8000";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub query_service_url: String,
    pub port: u16,
    pub chunk_timeout: Duration,
    pub persist_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set (copy .env.example to .env)")?;

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            query_service_url: lookup("QUERY_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_QUERY_SERVICE_URL.to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            chunk_timeout: Duration::from_secs(parse_or(&lookup, "CHUNK_TIMEOUT_SECS", 60)?),
            persist_attempts: parse_or(&lookup, "PERSIST_ATTEMPTS", 1u32)?.max(1),
        })
    }

    pub fn ingest(&self) -> IngestConfig {
        IngestConfig { chunk_timeout: self.chunk_timeout, persist_attempts: self.persist_attempts }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/chat")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.query_service_url, DEFAULT_QUERY_SERVICE_URL);
        assert_eq!(cfg.chunk_timeout, Duration::from_secs(60));
        assert_eq!(cfg.persist_attempts, 1);
        assert_eq!(cfg.db_max_connections, 10);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://db/chat"),
            ("PORT", "9000"),
            ("CHUNK_TIMEOUT_SECS", "5"),
            ("PERSIST_ATTEMPTS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.ingest().chunk_timeout, Duration::from_secs(5));
        assert_eq!(cfg.ingest().persist_attempts, 1);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(config(&[]).is_err());
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = config(&[("DATABASE_URL", "x"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
