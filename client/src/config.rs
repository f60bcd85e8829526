//! Configuration loaded from environment variables
//!
//! | Variable                          | Default     |
//! |-----------------------------------|-------------|
//! | `LIVEMETRICS_HOST`                | `localhost` |
//! | `LIVEMETRICS_HTTP_PORT`           | `52325`     |
//! | `LIVEMETRICS_HTTPS_PORT`          | `52323`     |
//! | `LIVEMETRICS_USE_HTTPS`           | `false`     |
//! | `LIVEMETRICS_AUTO_RECONNECT`      | `true`      |
//! | `LIVEMETRICS_RECONNECT_DELAY_MS`  | `2000`      |
//! | `LIVEMETRICS_CONNECT_TIMEOUT_MS`  | unset       |
//! | `LIVEMETRICS_ACCEPT_INVALID_CERTS`| `true`      |
//! | `LIVEMETRICS_MAX_RECORD_BYTES`    | `1048576`   |
//! | `LIVEMETRICS_LOG_LEVEL`           | `info`      |
//! | `LIVEMETRICS_LOG_FORMAT`          | `pretty`    |
//! | `LIVEMETRICS_METRICS_PORT`        | unset       |
//!
//! A session reads the config once when it starts; later changes only
//! affect sessions started afterwards.

use crate::connector::HttpOptions;
use crate::decode::DEFAULT_MAX_RECORD_BYTES;
use crate::endpoint::{EndpointTemplate, Scheme};
use crate::error::{LiveMetricsError, Result};
use crate::retry::RetryPolicy;
use crate::session::StreamSession;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "LIVEMETRICS_";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = LiveMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(LiveMetricsError::Config(format!(
                "unknown log format '{other}' (expected pretty or json)"
            ))),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Agent host name
    pub host: String,
    /// Agent port for plain HTTP
    pub http_port: u16,
    /// Agent port for HTTPS
    pub https_port: u16,
    /// Connect over HTTPS instead of HTTP
    pub use_https: bool,
    /// Reconnect after the stream ends or fails
    pub auto_reconnect: bool,
    /// Delay before each reconnect
    pub reconnect_delay_ms: u64,
    /// Bound on waiting for response headers; `None` waits indefinitely
    pub connect_timeout_ms: Option<u64>,
    /// Relax TLS validation for the local agent's self-signed certificate
    pub accept_invalid_certs: bool,
    /// Cap on bytes buffered for one record
    pub max_record_bytes: usize,
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Port for the Prometheus endpoint; `None` disables it
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            http_port: 52325,
            https_port: 52323,
            use_https: false,
            auto_reconnect: true,
            reconnect_delay_ms: 2000,
            connect_timeout_ms: None,
            accept_invalid_certs: true,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (used by tests instead of mutating the environment)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Config::default();

        let config = Config {
            host: env.string("HOST").unwrap_or(defaults.host),
            http_port: env.parse("HTTP_PORT")?.unwrap_or(defaults.http_port),
            https_port: env.parse("HTTPS_PORT")?.unwrap_or(defaults.https_port),
            use_https: env.flag("USE_HTTPS")?.unwrap_or(defaults.use_https),
            auto_reconnect: env.flag("AUTO_RECONNECT")?.unwrap_or(defaults.auto_reconnect),
            reconnect_delay_ms: env
                .parse("RECONNECT_DELAY_MS")?
                .unwrap_or(defaults.reconnect_delay_ms),
            connect_timeout_ms: env.parse("CONNECT_TIMEOUT_MS")?,
            accept_invalid_certs: env
                .flag("ACCEPT_INVALID_CERTS")?
                .unwrap_or(defaults.accept_invalid_certs),
            max_record_bytes: env
                .parse("MAX_RECORD_BYTES")?
                .unwrap_or(defaults.max_record_bytes),
            log_level: env.string("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env.parse("LOG_FORMAT")?.unwrap_or(defaults.log_format),
            metrics_port: env.parse("METRICS_PORT")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LiveMetricsError::Config("host must not be empty".to_string()));
        }
        if self.max_record_bytes == 0 {
            return Err(LiveMetricsError::Config(
                "max_record_bytes must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(LiveMetricsError::Config(
                "connect_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Agent endpoint for the configured scheme and port
    pub fn endpoint(&self) -> Result<EndpointTemplate> {
        if self.use_https {
            EndpointTemplate::new(Scheme::Https, self.host.as_str(), self.https_port)
        } else {
            EndpointTemplate::new(Scheme::Http, self.host.as_str(), self.http_port)
        }
    }

    /// Reconnect policy from `auto_reconnect` and `reconnect_delay_ms`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_settings(self.auto_reconnect, self.reconnect_delay_ms)
    }

    /// HTTP client options carrying the TLS trust setting
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            accept_invalid_certs: self.accept_invalid_certs,
            ..HttpOptions::default()
        }
    }

    /// Session for `target_id` with every stream setting applied
    pub fn session(&self, target_id: impl Into<String>) -> Result<StreamSession> {
        let mut session = StreamSession::new(target_id, &self.endpoint()?, self.retry_policy())
            .max_record_bytes(self.max_record_bytes);
        if let Some(ms) = self.connect_timeout_ms {
            session = session.connect_timeout(Duration::from_millis(ms));
        }
        Ok(session)
    }
}

/// Prefixed key lookup with typed parsing
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    LiveMetricsError::Config(format!("{ENV_PREFIX}{key}='{raw}': {e}"))
                })
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.string(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(LiveMetricsError::Config(format!(
                    "{ENV_PREFIX}{key}='{raw}': expected true or false"
                ))),
            })
            .transpose()
    }
}
