//! Error types for the livemetrics client

use thiserror::Error;

// Re-export StreamError from livemetrics-core
pub use livemetrics_core::StreamError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, LiveMetricsError>;

/// Main error type for the client
///
/// Covers everything that can fail *synchronously* for a caller: loading
/// configuration, building the HTTP client, the one-shot process listing,
/// metrics registration. Failures inside a running stream session never
/// surface here; they are [`StreamError`]s handled by the reconnect loop.
#[derive(Error, Debug)]
pub enum LiveMetricsError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid endpoint URL
    #[error("invalid endpoint '{endpoint}': {reason}")]
    Endpoint {
        /// The rejected input
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// HTTP client construction or request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stream error surfaced from a one-shot call
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_converts_transparently() {
        let err: LiveMetricsError = StreamError::Status(404).into();
        assert!(matches!(err, LiveMetricsError::Stream(StreamError::Status(404))));
        assert_eq!(err.to_string(), "unexpected HTTP status 404");
    }

    /// Every variant has a constructor in this crate
    fn origin(err: &LiveMetricsError) -> &'static str {
        match err {
            LiveMetricsError::Config(_) => "Config::from_env",
            LiveMetricsError::Endpoint { .. } => "EndpointTemplate",
            LiveMetricsError::Http(_) => "HttpOptions::build_client / list_processes",
            LiveMetricsError::Stream(_) => "list_processes",
            LiveMetricsError::Metrics(_) => "Metrics::init",
        }
    }

    #[test]
    fn test_variants_map_to_their_origin() {
        assert_eq!(origin(&LiveMetricsError::Config("x".into())), "Config::from_env");
        assert_eq!(origin(&StreamError::Status(500).into()), "list_processes");
        assert_eq!(origin(&LiveMetricsError::Metrics("dup".into())), "Metrics::init");
    }

    #[test]
    fn test_endpoint_error_display() {
        let err = LiveMetricsError::Endpoint {
            endpoint: "ftp://localhost".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid endpoint 'ftp://localhost': unsupported scheme"
        );
    }
}
