//! Client configuration from environment variables.

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL ({value:?}): {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("cannot derive a WebSocket URL from scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of automatic reconnect attempts after a drop (0 = never)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt + 1`, where `attempt` is the
    /// number of reconnects already made since the last successful open.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

/// Endpoints and reconnect policy for the conversation client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base of the REST API, e.g. `https://api.example.com`.
    pub api_base: Url,
    /// Base of the realtime endpoint, e.g. `wss://api.example.com`.
    pub ws_base: Url,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `CASALINK_API_BASE`: REST base URL (default: "http://localhost:8000")
    /// - `CASALINK_WS_BASE`: WebSocket base URL (default: derived from the API base)
    /// - `CASALINK_RECONNECT_MAX_ATTEMPTS`: automatic reconnects after a drop (default: 5)
    /// - `CASALINK_RECONNECT_BASE_MS`: first backoff delay (default: 1000)
    /// - `CASALINK_RECONNECT_MAX_MS`: backoff cap (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base = parse_url(
            "CASALINK_API_BASE",
            lookup("CASALINK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )?;

        let ws_base = match lookup("CASALINK_WS_BASE") {
            Some(raw) => parse_url("CASALINK_WS_BASE", raw)?,
            None => ws_base_from_http(&api_base)?,
        };

        let defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            max_attempts: parse_number(
                "CASALINK_RECONNECT_MAX_ATTEMPTS",
                lookup("CASALINK_RECONNECT_MAX_ATTEMPTS"),
                defaults.max_attempts,
            )?,
            initial_delay_ms: parse_number(
                "CASALINK_RECONNECT_BASE_MS",
                lookup("CASALINK_RECONNECT_BASE_MS"),
                defaults.initial_delay_ms,
            )?,
            max_delay_ms: parse_number(
                "CASALINK_RECONNECT_MAX_MS",
                lookup("CASALINK_RECONNECT_MAX_MS"),
                defaults.max_delay_ms,
            )?,
            backoff_multiplier: defaults.backoff_multiplier,
        };

        Ok(Self {
            api_base,
            ws_base,
            reconnect,
        })
    }
}

/// Map an HTTP base URL onto the matching WebSocket scheme.
pub fn ws_base_from_http(http: &Url) -> Result<Url, ConfigError> {
    let scheme = match http.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    let mut ws = http.clone();
    ws.set_scheme(scheme)
        .map_err(|()| ConfigError::UnsupportedScheme(http.scheme().to_string()))?;
    Ok(ws)
}

fn parse_url(var: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { var, value, source })
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
