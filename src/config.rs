//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Nothing is mutable after startup.
//!
//! | Variable                | Default   |
//! |-------------------------|-----------|
//! | `HOST`                  | `0.0.0.0` |
//! | `PORT`                  | `9000`    |
//! | `MAX_WORKERS`           | `4`       |
//! | `DATA_DIR`              | `data`    |
//! | `DISCONNECT_POLICY`     | `detach`  |
//! | `REPORT_HANDLER_ERRORS` | `false`   |
//! | `LOG_FORMAT`            | `text`    |

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::GatewayError;

/// What a session does with its outstanding requests when the client
/// disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Let outstanding jobs finish; their results are discarded.
    #[default]
    Detach,
    /// Cancel jobs still waiting for a worker; running jobs finish and
    /// their results are discarded.
    Abort,
}

impl FromStr for DisconnectPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "detach" => Ok(Self::Detach),
            "abort" => Ok(Self::Abort),
            other => Err(GatewayError::Config(format!(
                "DISCONNECT_POLICY must be `detach` or `abort`, got `{other}`"
            ))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(GatewayError::Config(format!(
                "LOG_FORMAT must be `text` or `json`, got `{other}`"
            ))),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind (e.g. `0.0.0.0`).
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// Maximum number of handler jobs running at once.
    pub max_workers: usize,

    /// Directory `LoadData` reads files from.
    pub data_dir: PathBuf,

    /// Behaviour for outstanding requests when a client disconnects.
    pub disconnect_policy: DisconnectPolicy,

    /// Send an error envelope when a handler fails instead of staying silent.
    pub report_handler_errors: bool,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            max_workers: 4,
            data_dir: PathBuf::from("data"),
            disconnect_policy: DisconnectPolicy::Detach,
            report_handler_errors: false,
            log_format: LogFormat::Text,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::from_lookup`].
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Numeric and boolean values that fail to parse fall back to their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `MAX_WORKERS` is zero or an
    /// enumerated setting has an unknown value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let defaults = Self::default();

        let max_workers = parse_or(&lookup, "MAX_WORKERS", defaults.max_workers);
        if max_workers == 0 {
            return Err(GatewayError::Config(
                "MAX_WORKERS must be greater than zero".to_string(),
            ));
        }

        let disconnect_policy = lookup("DISCONNECT_POLICY")
            .map(|v| v.parse::<DisconnectPolicy>())
            .transpose()?
            .unwrap_or(defaults.disconnect_policy);
        let log_format = lookup("LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or(defaults.log_format);

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            max_workers,
            data_dir: lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            disconnect_policy,
            report_handler_errors: parse_bool_or(
                &lookup,
                "REPORT_HANDLER_ERRORS",
                defaults.report_handler_errors,
            ),
            log_format,
        })
    }

    /// `host:port` string used for binding and logging.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
