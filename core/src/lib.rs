//! livemetrics-core - Core types for the live metrics stream client
//!
//! This crate holds the types shared between the stream engine and the
//! code that consumes its output:
//!
//! - [`MetricRecord`] - one decoded telemetry record (loosely typed JSON)
//! - [`RecordSink`] trait - where decoded records are delivered
//! - [`StreamError`] - error type for connection attempts and decoding
//!
//! Display layers depend on this crate alone; they never need the HTTP
//! stack pulled in by `livemetrics-client`.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod error;
mod record;
mod sink;

pub use error::StreamError;
pub use record::MetricRecord;
pub use sink::{ChannelSink, RecordSink};
