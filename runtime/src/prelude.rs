//! Convenience re-exports for embedding a live metrics stream.
//!
//! ```rust
//! use livemetrics_runtime::prelude::*;
//! ```

// Records and sinks
pub use livemetrics_core::{ChannelSink, MetricRecord, RecordSink};

// Sessions
pub use livemetrics_client::{
    CancelHandle, Config, EndpointTemplate, RetryPolicy, SessionStats, StreamSession,
    start_streaming, start_streaming_with,
};

// Transport
pub use livemetrics_client::{Connector, HttpConnector, HttpOptions};

// Sinks
pub use livemetrics_client::StdoutSink;

// Discovery
pub use livemetrics_client::{ProcessInfo, list_processes};

// Error types
pub use livemetrics_client::{LiveMetricsError, StreamError};

// Runtime
pub use crate::RuntimeBuilder;
