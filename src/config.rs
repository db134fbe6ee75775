use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    /// Upper bound on every single attendance store call.
    pub store_timeout: Duration,
    /// Idle time after which an unsaved attendance edit session is dropped.
    pub edit_session_ttl: Duration,

    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} must be set", key));

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or(&lookup, "ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or(&lookup, "REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed_or(&lookup, "RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api/v1".to_string()),

            store_timeout: Duration::from_millis(parsed_or(&lookup, "STORE_TIMEOUT_MS", 10_000)?),
            edit_session_ttl: Duration::from_secs(parsed_or(&lookup, "EDIT_SESSION_TTL_SECS", 1800)?),

            log_level: parsed_or(&lookup, "LOG_LEVEL", tracing::Level::INFO)?,
        })
    }
}

fn parsed_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("SERVER_ADDR", "127.0.0.1:8080"),
        ("DATABASE_URL", "mysql://localhost/dance"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_fill_optional_settings() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.store_timeout, Duration::from_secs(10));
        assert_eq!(config.edit_session_ttl, Duration::from_secs(1800));
        assert_eq!(config.log_level, tracing::Level::INFO);
    }

    #[test]
    fn missing_required_settings_are_reported() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn malformed_numbers_are_errors_not_panics() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("STORE_TIMEOUT_MS", "soon"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("STORE_TIMEOUT_MS"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("STORE_TIMEOUT_MS", "250"));
        vars.push(("LOG_LEVEL", "debug"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }
}
