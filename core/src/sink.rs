//! Record sink trait
//!
//! The [`RecordSink`] is the consumer side of a stream session. The engine
//! calls it once per decoded record, from the session's own task, never
//! concurrently for the same session.

use crate::record::MetricRecord;
use tokio::sync::mpsc;

/// Sink trait - receives decoded records
///
/// # Implementation Requirements
///
/// - Sinks must be `Send + Sync` because the session runs on a spawned task
/// - `on_record` must not block; hand heavy work off to a channel
///
/// Closures implement this trait already; channels go through [`ChannelSink`]:
///
/// ```
/// use livemetrics_core::{MetricRecord, RecordSink};
///
/// let sink = |record: MetricRecord| println!("{record}");
/// sink.on_record(MetricRecord::new(serde_json::json!({"name": "a", "value": 1})));
/// ```
pub trait RecordSink: Send + Sync {
    /// Called once per decoded record, in wire order
    fn on_record(&self, record: MetricRecord);
}

impl<F> RecordSink for F
where
    F: Fn(MetricRecord) + Send + Sync,
{
    fn on_record(&self, record: MetricRecord) {
        self(record)
    }
}

/// Sink that forwards records into an unbounded tokio channel
///
/// Lets a consumer on another task (a UI loop, a renderer) pull records
/// without doing any work inside the session's task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MetricRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MetricRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wrap an existing sender
    pub fn from_sender(tx: mpsc::UnboundedSender<MetricRecord>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelSink {
    fn on_record(&self, record: MetricRecord) {
        // A closed receiver means the consumer went away; the session is
        // cancelled through its handle, not through the sink.
        let _ = self.tx.send(record);
    }
}
