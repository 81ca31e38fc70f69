//! Streamer Configuration Settings
//!
//! Configuration types for the price streamer, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Default upstream endpoint listing top assets with USD prices.
pub const DEFAULT_COINDESK_API_URL: &str = "https://data-api.coindesk.com/asset/v1/top/list";

/// Price source settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Upstream API URL.
    pub api_url: String,
    /// Asset symbol selected from the upstream list.
    pub symbol: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Upstream timestamps older than this are replaced by the current time.
    pub stale_after: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_COINDESK_API_URL.to_string(),
            symbol: "BTC".to_string(),
            timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(3600),
        }
    }
}

/// History and fan-out sizing.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Number of samples retained in the rolling history.
    pub history_capacity: usize,
    /// Per-subscriber queue capacity.
    pub client_buffer_size: usize,
    /// Interval between upstream polls.
    pub poll_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            client_buffer_size: 50,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP listen port.
    pub port: u16,
    /// Directory holding `index.html`.
    pub static_dir: PathBuf,
    /// Maximum time to wait for open connections on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: PathBuf::from("./static"),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Complete streamer configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamerConfig {
    /// Upstream price source settings.
    pub source: SourceSettings,
    /// History and fan-out sizing.
    pub stream: StreamSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

impl StreamerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a capacity, interval or timeout is explicitly set to zero,
    /// or if the upstream URL or symbol is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source_defaults = SourceSettings::default();
        let stream_defaults = StreamSettings::default();
        let server_defaults = ServerSettings::default();

        let api_url = lookup("COINDESK_API_URL").unwrap_or(source_defaults.api_url);
        if api_url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("COINDESK_API_URL".to_string()));
        }

        let symbol = lookup("PRICE_SYMBOL").unwrap_or(source_defaults.symbol);
        if symbol.trim().is_empty() {
            return Err(ConfigError::EmptyValue("PRICE_SYMBOL".to_string()));
        }

        let source = SourceSettings {
            api_url,
            symbol: symbol.trim().to_uppercase(),
            timeout: non_zero_duration(
                "FETCH_TIMEOUT_SECS",
                parse_duration_secs(&lookup, "FETCH_TIMEOUT_SECS", source_defaults.timeout),
            )?,
            stale_after: parse_duration_secs(
                &lookup,
                "STALE_AFTER_SECS",
                source_defaults.stale_after,
            ),
        };

        let stream = StreamSettings {
            history_capacity: non_zero(
                "STORAGE_CAPACITY",
                parse_usize(&lookup, "STORAGE_CAPACITY", stream_defaults.history_capacity),
            )?,
            client_buffer_size: non_zero(
                "CLIENT_BUFFER_SIZE",
                parse_usize(
                    &lookup,
                    "CLIENT_BUFFER_SIZE",
                    stream_defaults.client_buffer_size,
                ),
            )?,
            poll_interval: non_zero_duration(
                "POLL_INTERVAL_SECS",
                parse_duration_secs(&lookup, "POLL_INTERVAL_SECS", stream_defaults.poll_interval),
            )?,
        };

        let server = ServerSettings {
            port: parse_u16(&lookup, "PORT", server_defaults.port),
            static_dir: lookup("STATIC_DIR")
                .filter(|dir| !dir.is_empty())
                .map_or(server_defaults.static_dir, PathBuf::from),
            shutdown_timeout: parse_duration_secs(
                &lookup,
                "SHUTDOWN_TIMEOUT_SECS",
                server_defaults.shutdown_timeout,
            ),
        };

        Ok(Self {
            source,
            stream,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn non_zero(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

fn non_zero_duration(key: &str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(value)
}

fn parse_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
