//! livemetrics runtime: stream one process's live metrics with no wiring
//!
//! Provides [`run()`] for zero-boilerplate startup, and [`RuntimeBuilder`]
//! for hosts that need control over the sink, the metrics port, or the
//! output format.
//!
//! # Quick start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     livemetrics_runtime::run("4242").await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod prelude;

use livemetrics_client::{
    CancelHandle, Config, HttpConnector, LogFormat, Metrics, MetricsServer, ProcessInfo,
    StdoutSink, list_processes,
};
use livemetrics_core::RecordSink;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Stream `target_id` to stdout until Ctrl+C or SIGTERM.
///
/// Loads configuration from `LIVEMETRICS_*` environment variables,
/// initialises tracing and (if a port is configured) metrics, then runs a
/// reconnecting session until a shutdown signal arrives.
pub async fn run(target_id: impl Into<String>) -> anyhow::Result<()> {
    RuntimeBuilder::new().start(target_id).await
}

/// Builder for controlling runtime behaviour.
///
/// # Example
///
/// ```ignore
/// RuntimeBuilder::new()
///     .metrics_port(9091)
///     .sink(|record: MetricRecord| println!("{record}"))
///     .start("4242")
///     .await
/// ```
pub struct RuntimeBuilder {
    metrics_port: Option<u16>,
    pretty: bool,
    sink: Option<Arc<dyn RecordSink>>,
}

impl RuntimeBuilder {
    /// Create a new builder; unset options come from the environment.
    pub fn new() -> Self {
        Self {
            metrics_port: None,
            pretty: false,
            sink: None,
        }
    }

    /// Override the metrics HTTP server port.
    ///
    /// Default: `LIVEMETRICS_METRICS_PORT`, or no metrics server.
    pub fn metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Pretty-print records on the default stdout sink.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Deliver records to `sink` instead of stdout.
    pub fn sink<S: RecordSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Stream `target_id` until a shutdown signal, or until the session
    /// ends on its own when auto-reconnect is disabled.
    ///
    /// This is the terminal method; it blocks until shutdown.
    pub async fn start(self, target_id: impl Into<String>) -> anyhow::Result<()> {
        let target_id = target_id.into();

        // ── 1. Load config from env ──────────────────────────────
        let config = Config::from_env()?;

        // ── 2. Init tracing ──────────────────────────────────────
        init_tracing(&config);

        let endpoint = config.endpoint()?;
        info!(
            target_id = %target_id,
            endpoint = %endpoint,
            auto_reconnect = config.auto_reconnect,
            reconnect_delay_ms = config.reconnect_delay_ms,
            "Starting livemetrics"
        );

        // ── 3. Init metrics + HTTP server ────────────────────────
        let _metrics_handle = match self.metrics_port.or(config.metrics_port) {
            Some(port) => {
                Metrics::init()?;
                info!(port, "Metrics server started");
                Some(MetricsServer::start(port))
            }
            None => None,
        };

        // ── 4. Start the session ─────────────────────────────────
        let options = config.http_options();
        options.warn_if_relaxed(&endpoint);
        let connector = Arc::new(HttpConnector::new(&options)?);
        let sink: Arc<dyn RecordSink> = match self.sink {
            Some(sink) => sink,
            None if self.pretty => Arc::new(StdoutSink::pretty()),
            None => Arc::new(StdoutSink::new()),
        };
        let handle = config.session(target_id)?.start(connector, sink);

        // ── 5. Run until shutdown ────────────────────────────────
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = handle.wait() => info!("Stream session ended on its own"),
        }

        // ── 6. Shutdown ──────────────────────────────────────────
        stop(&handle).await;
        info!("livemetrics shutdown complete");

        Ok(())
    }

    /// Ask the agent which processes it can monitor.
    pub async fn processes(self) -> anyhow::Result<Vec<ProcessInfo>> {
        let config = Config::from_env()?;
        init_tracing(&config);

        let client = config.http_options().build_client()?;
        let endpoint = config.endpoint()?;
        info!(endpoint = %endpoint, "Listing processes");

        Ok(list_processes(&client, &endpoint).await?)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn stop(handle: &CancelHandle) {
    handle.cancel();
    handle.wait().await;

    let stats = handle.stats();
    info!(
        target_id = handle.target_id(),
        connections = stats.connections,
        reconnects = stats.reconnects,
        records = stats.records,
        malformed = stats.malformed,
        "Session summary"
    );
}

/// Initialise the tracing subscriber based on config.
///
/// Logs go to stderr so stdout carries only records.
fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // A host may already have installed a subscriber
    let _ = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
