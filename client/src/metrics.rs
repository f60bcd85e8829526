//! Prometheus metrics for livemetrics

use crate::error::{LiveMetricsError, Result};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All livemetrics metrics
///
/// Counters aggregate across sessions. Per-session numbers live in
/// [`SessionStats`](crate::session::SessionStats).
pub struct Metrics {
    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────
    /// Records delivered to sinks
    pub records_total: Counter,

    /// Delimited segments that failed to decode (by reason)
    pub malformed_records_total: CounterVec,

    // ─────────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection attempts (first connect and reconnects)
    pub connections_total: Counter,

    /// Reconnect attempts only
    pub reconnects_total: Counter,

    /// Connection attempts that ended in a transport failure (by kind)
    pub transport_errors_total: CounterVec,

    /// Sessions currently running
    pub active_sessions: Gauge,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            records_total: register_counter!(
                "livemetrics_records_total",
                "Total records delivered to sinks"
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("records_total: {e}")))?,

            malformed_records_total: register_counter_vec!(
                "livemetrics_malformed_records_total",
                "Total delimited segments discarded as malformed",
                &["reason"]
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("malformed_records_total: {e}")))?,

            connections_total: register_counter!(
                "livemetrics_connections_total",
                "Total connection attempts to the agent"
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("connections_total: {e}")))?,

            reconnects_total: register_counter!(
                "livemetrics_reconnects_total",
                "Total reconnect attempts after a stream ended"
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("reconnects_total: {e}")))?,

            transport_errors_total: register_counter_vec!(
                "livemetrics_transport_errors_total",
                "Total connection attempts ended by a transport failure",
                &["kind"]
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("transport_errors_total: {e}")))?,

            active_sessions: register_gauge!(
                "livemetrics_active_sessions",
                "Number of running stream sessions"
            )
            .map_err(|e| LiveMetricsError::Metrics(format!("active_sessions: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| LiveMetricsError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Count a record handed to a sink
    pub fn record_delivered(&self) {
        self.records_total.inc();
    }

    /// Count a discarded segment, labelled by `reason`
    pub fn record_malformed(&self, reason: &str) {
        self.malformed_records_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a connection attempt; `reconnect` is false for the first one
    pub fn record_connect(&self, reconnect: bool) {
        self.connections_total.inc();
        if reconnect {
            self.reconnects_total.inc();
        }
    }

    /// Count a failed connection attempt, labelled by `kind`
    pub fn record_transport_error(&self, kind: &str) {
        self.transport_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// A session task started
    pub fn inc_sessions(&self) {
        self.active_sessions.inc();
    }

    /// A session task exited
    pub fn dec_sessions(&self) {
        self.active_sessions.dec();
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Run `f` against the global metrics if they were initialized
pub(crate) fn with_metrics(f: impl FnOnce(&Metrics)) {
    if let Some(metrics) = Metrics::get() {
        f(metrics);
    }
}
