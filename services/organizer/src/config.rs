//! services/organizer/src/config.rs
//!
//! Defines the organizer's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. An absent `FIREBASE_CONFIG` is not an
//! error: it selects local-fallback mode.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_APP_ID: &str = "app-casal-default";
pub const DEFAULT_UI_ORIGIN: &str = "http://localhost:5173";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The subset of the Firebase web config the adapters need.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub api_key: String,
    pub project_id: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Namespace segment of the shared document path.
    pub app_id: String,
    /// `None` selects local-fallback mode.
    pub store: Option<StoreConfig>,
    pub auth_token: Option<String>,
    pub poll_interval: Duration,
    /// Origin allowed by CORS, where the browser UI is served from.
    pub ui_origin: String,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
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

        // --- Shared Store Settings ---
        let app_id = lookup("CASAL_APP_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

        let store = match lookup("FIREBASE_CONFIG") {
            Some(raw) => parse_store_config(&raw)?,
            None => None,
        };

        let auth_token = lookup("CASAL_AUTH_TOKEN").filter(|token| !token.trim().is_empty());

        let poll_interval_ms = match lookup("CASAL_POLL_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("CASAL_POLL_INTERVAL_MS".to_string(), e.to_string())
            })?,
            None => 2000,
        };

        let ui_origin = lookup("UI_ORIGIN")
            .filter(|origin| !origin.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UI_ORIGIN.to_string());

        Ok(Self {
            bind_address,
            log_level,
            app_id,
            store,
            auth_token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            ui_origin,
        })
    }
}

/// An empty string or an empty JSON object counts as "not configured".
fn parse_store_config(raw: &str) -> Result<Option<StoreConfig>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue("FIREBASE_CONFIG".to_string(), reason);

    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    match value.as_object() {
        Some(map) if map.is_empty() => Ok(None),
        Some(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| invalid(e.to_string())),
        None => Err(invalid("expected a JSON object".to_string())),
    }
}
