//! Connector system
//!
//! A [`Connector`] opens one connection attempt and hands back the response
//! body as a stream of byte chunks. The session owns the stream; dropping
//! it closes the underlying connection.
//!
//! # Architecture
//!
//! ```text
//! StreamSession ──► Connector::connect(url) ──► ChunkStream ──► RecordDecoder
//!       ▲                                                            │
//!       └──────────── reconnect on end / error ◄─────────────────────┘
//! ```
//!
//! # Built-in Connectors
//!
//! - `HttpConnector` - reqwest-based GET with a streaming body

mod http;

pub use http::{HttpConnector, HttpOptions};

use crate::error::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio_stream::Stream;

/// Response body of one connection attempt
///
/// Yields chunks in arrival order. `None` is a remote close; `Some(Err(_))`
/// is a mid-stream transport failure.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Connector trait - opens one connection to the metrics endpoint
///
/// # Implementation Requirements
///
/// - Resolve once response headers arrive; do not wait for the body
/// - Report non-success statuses as [`StreamError::Status`]
/// - Dropping the returned stream must release the connection
///
/// # Example
///
/// ```ignore
/// use livemetrics_client::connector::{ChunkStream, Connector};
/// use livemetrics_client::StreamError;
///
/// struct ReplayConnector(Vec<bytes::Bytes>);
///
/// #[async_trait::async_trait]
/// impl Connector for ReplayConnector {
///     fn name(&self) -> &'static str {
///         "replay"
///     }
///
///     async fn connect(&self, _url: &str) -> Result<ChunkStream, StreamError> {
///         let chunks = self.0.clone().into_iter().map(Ok);
///         Ok(Box::pin(tokio_stream::iter(chunks)))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Open a connection and return its body stream
    ///
    /// # Errors
    /// - `StreamError::Connection` - DNS, connect or TLS failure
    /// - `StreamError::Status` - the agent answered with a non-2xx status
    async fn connect(&self, url: &str) -> Result<ChunkStream, StreamError>;
}
