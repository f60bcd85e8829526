//! Stdout sink for terminal use
//!
//! Prints records as they arrive. Useful when no dashboard is attached.

use livemetrics_core::{MetricRecord, RecordSink};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Stdout sink - prints one line per record
pub struct StdoutSink {
    /// Pretty print the full record as JSON
    pretty: bool,
    /// Count of records written
    written_count: AtomicU64,
}

impl StdoutSink {
    /// Compact `name=value` lines
    pub fn new() -> Self {
        Self {
            pretty: false,
            written_count: AtomicU64::new(0),
        }
    }

    /// Full record, pretty-printed JSON
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            written_count: AtomicU64::new(0),
        }
    }

    /// Get total records written
    pub fn written_count(&self) -> u64 {
        self.written_count.load(Ordering::Relaxed)
    }

    fn write_record(&self, out: &mut impl Write, record: &MetricRecord) -> std::io::Result<()> {
        if self.pretty {
            let json = serde_json::to_string_pretty(record.as_json())
                .map_err(std::io::Error::other)?;
            writeln!(out, "{json}")
        } else {
            writeln!(out, "{record}")
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for StdoutSink {
    fn on_record(&self, record: MetricRecord) {
        let mut stdout = std::io::stdout().lock();
        match self.write_record(&mut stdout, &record) {
            Ok(()) => {
                self.written_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, "stdout write failed"),
        }
    }
}
