//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where records are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// A process-local store that forgets everything on restart.
    Memory,
    /// A remote PocketBase instance at this base URL.
    Remote(String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreBackend,
    pub log_level: Level,
    pub cors_origin: String,
    pub search_debounce: Duration,
    pub store_timeout: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        // --- Record store settings ---
        let store = match lookup("STORE_URL").as_deref().map(str::trim) {
            None | Some("") | Some("memory") => StoreBackend::Memory,
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                StoreBackend::Remote(url.trim_end_matches('/').to_string())
            }
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "STORE_URL".to_string(),
                    format!("'{}' is neither 'memory' nor an http(s) URL", other),
                ))
            }
        };

        let store_timeout = match lookup("STORE_TIMEOUT_SECS") {
            None => None,
            Some(raw) => Some(Duration::from_secs(parse_number("STORE_TIMEOUT_SECS", &raw)?)),
        };

        // --- Search settings ---
        let search_debounce = match lookup("SEARCH_DEBOUNCE_MS") {
            None => training_core::search::QUIET_PERIOD,
            Some(raw) => Duration::from_millis(parse_number("SEARCH_DEBOUNCE_MS", &raw)?),
        };

        Ok(Self {
            bind_address,
            store,
            log_level,
            cors_origin,
            search_debounce,
            store_timeout,
        })
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
