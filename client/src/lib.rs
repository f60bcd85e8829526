//! livemetrics-client - live metrics stream consumer
//!
//! Streams performance metrics from a .NET runtime monitoring agent and
//! pushes each decoded record to a sink. The connection is long-lived and
//! self-healing: when it drops, the session reconnects after a fixed delay
//! until it is cancelled.
//!
//! # Pipeline
//!
//! ```text
//! Connector ──► RecordDecoder ──► RecordSink
//!    ▲  (bytes)      (0x1E framed JSON)   (MetricRecord)
//!    └── StreamSession: connect / receive / reconnect / cancel
//! ```
//!
//! # Example
//!
//! ```ignore
//! use livemetrics_client::{start_streaming, EndpointTemplate, MetricRecord, RetryPolicy};
//!
//! let endpoint = EndpointTemplate::https("localhost", 52323)?;
//! let handle = start_streaming("4242", &endpoint, RetryPolicy::default(), |r: MetricRecord| {
//!     println!("{r}");
//! })?;
//! // ...
//! handle.cancel();
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

pub mod config;
pub mod connector;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod metrics_server;
pub mod processes;
pub mod retry;
pub mod session;
pub mod stdout;

pub use config::{Config, LogFormat};
pub use connector::{ChunkStream, Connector, HttpConnector, HttpOptions};
pub use decode::{RECORD_SEPARATOR, RecordDecoder};
pub use endpoint::{EndpointTemplate, Scheme};
pub use error::{LiveMetricsError, Result, StreamError};
pub use livemetrics_core::{ChannelSink, MetricRecord, RecordSink};
pub use metrics::Metrics;
pub use metrics_server::MetricsServer;
pub use processes::{ProcessInfo, list_processes};
pub use retry::RetryPolicy;
pub use session::{
    CancelHandle, SessionStats, StreamSession, start_streaming, start_streaming_with,
};
pub use stdout::StdoutSink;
