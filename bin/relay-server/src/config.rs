//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use relay_core::fragments::FRAGMENT_DELAY;
use relay_core::relay::DEFAULT_UPSTREAM_TIMEOUT;
use relay_core::upstream::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use thiserror::Error;

/// Accepted names for the upstream credential, in priority order.
pub const API_KEY_VARS: [&str; 4] = ["GOOGLE_API_KEY", "GEMINI_API_KEY", "GEMINI_APIKEY", "API_KEY"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no Gemini API key found; set GOOGLE_API_KEY or GEMINI_API_KEY in the environment or .env"
    )]
    MissingApiKey,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration for relay-server.
///
/// Only the API key is mandatory.
#[derive(Clone)]
pub struct Config {
    /// Upstream credential (first non-empty of [`API_KEY_VARS`]).
    pub api_key: String,

    /// Gemini model identifier (default: `"gemini-2.5-flash"`).
    pub model: String,

    /// Gemini API root; override to go through a proxy.
    pub upstream_base_url: String,

    /// Address to bind, from `HOST` and `PORT` (default: `127.0.0.1:8000`).
    pub bind_address: String,

    /// Bound on a single upstream call.
    pub upstream_timeout: Duration,

    /// Pause between streamed fragments.
    pub fragment_delay: Duration,

    /// Where exchange records are appended.
    pub exchange_log_path: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("bind_address", &self.bind_address)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("fragment_delay", &self.fragment_delay)
            .field("exchange_log_path", &self.exchange_log_path)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

impl Config {
    /// Build [`Config`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset throughout.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|&key| get(key))
            .ok_or(ConfigError::MissingApiKey)?;

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let port: u16 = parse(&get, "PORT", 8000)?;
        let bind_address = format!("{host}:{port}");

        let timeout_secs: u64 = parse(&get, "RELAY_UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_UPSTREAM_TIMEOUT_SECS",
                reason: "must be at least 1".into(),
            });
        }
        let delay_ms: u64 = parse(&get, "RELAY_FRAGMENT_DELAY_MS", FRAGMENT_DELAY.as_millis() as u64)?;

        Ok(Self {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            upstream_base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            bind_address,
            upstream_timeout: Duration::from_secs(timeout_secs),
            fragment_delay: Duration::from_millis(delay_ms),
            exchange_log_path: get("RELAY_EXCHANGE_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs/exchanges.jsonl")),
            log_level: get("RELAY_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: get("RELAY_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            cors_allowed_origins: get("RELAY_CORS_ORIGINS"),
        })
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
