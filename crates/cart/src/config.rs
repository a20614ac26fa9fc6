//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CART_STORAGE_NAMESPACE` - App namespace prefixed to storage keys (default: `@GoMarketplace`)
//! - `CART_STORAGE_DIR` - Directory for the file-backed store (default: `.cart`)
//! - `CART_LOG_FORMAT` - `text` or `json` (default: `text`)

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default app namespace for storage keys.
pub const DEFAULT_NAMESPACE: &str = "@GoMarketplace";

const DEFAULT_STORAGE_DIR: &str = ".cart";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("invalid log format: {s} (expected text or json)")),
        }
    }
}

/// Cart configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartConfig {
    /// Namespace prefixed to every storage key
    pub namespace: String,
    /// Directory used by the file-backed store
    pub storage_dir: PathBuf,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            log_format: LogFormat::Text,
        }
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let namespace = lookup("CART_STORAGE_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned());
        if namespace.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "CART_STORAGE_NAMESPACE".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let storage_dir = lookup("CART_STORAGE_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);

        let log_format = lookup("CART_LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_LOG_FORMAT".to_string(), e))?
            .unwrap_or_default();

        Ok(Self {
            namespace,
            storage_dir,
            log_format,
        })
    }

    /// Storage key holding the persisted cart, e.g. `@GoMarketplace:products`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        products_key(&self.namespace)
    }
}

/// Storage key for the cart products under `namespace`.
#[must_use]
pub fn products_key(namespace: &str) -> String {
    format!("{namespace}:products")
}
