use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub log_level: String,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mongodb_uri = required(&lookup, "MONGODB_URI")?;
        if !mongodb_uri.starts_with("mongodb") {
            return Err(ConfigError::Invalid {
                key: "MONGODB_URI",
                reason: "must be a MongoDB connection string".to_string(),
            });
        }

        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            warn!("JWT_SECRET should be at least 32 characters long");
        }

        Ok(Config {
            host: try_load(&lookup, "HOST", "0.0.0.0")?,
            port: try_load(&lookup, "PORT", "5000")?,
            mongodb_uri,
            database_name: try_load(&lookup, "DATABASE_NAME", "splitbill")?,
            jwt_secret,
            token_ttl_secs: try_load(&lookup, "TOKEN_TTL_SECS", "3600")?,
            log_level: try_load(&lookup, "LOG_LEVEL", "info")?,
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}
