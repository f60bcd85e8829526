//! Error types for the live metrics stream

use thiserror::Error;

/// Error type for a single connection attempt or record decode
///
/// Every variant except [`StreamError::Decode`] and
/// [`StreamError::Oversized`] ends the current connection attempt. The
/// session treats all of them the same way: reconnect if still active and
/// retry is enabled, otherwise stop.
///
/// # Example
///
/// ```
/// use livemetrics_core::StreamError;
///
/// let err = StreamError::Status(503);
/// assert!(err.is_transport());
/// assert_eq!(err.to_string(), "unexpected HTTP status 503");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Connection could not be established
    ///
    /// Examples: DNS lookup failed, connection refused, TLS handshake error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The agent answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body failed mid-stream
    #[error("transport error: {0}")]
    Transport(String),

    /// No response headers within the configured connect timeout
    #[error("connect timed out after {0}ms")]
    Timeout(u64),

    /// A delimited segment was not valid JSON (or not valid UTF-8)
    #[error("malformed record: {0}")]
    Decode(String),

    /// Pending bytes exceeded the record size limit without a separator
    #[error("record exceeds {limit} bytes without a separator")]
    Oversized {
        /// Configured limit in bytes
        limit: usize,
    },
}

impl StreamError {
    /// Whether this error terminates the current connection attempt
    pub fn is_transport(&self) -> bool {
        !matches!(self, StreamError::Decode(_) | StreamError::Oversized { .. })
    }
}
