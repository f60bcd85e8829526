//! Stream sessions
//!
//! A [`StreamSession`] is one logical "stream metrics for target X"
//! request. It runs on its own task and cycles through
//! connect → receive → disconnect for as long as it is active:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!       ┌─────────┐  headers  ┌─────────┐  close / error    │ active && retry
//!  ───► │ connect │ ────────► │ receive │ ──────────────► flush ──► sleep(delay)
//!       └─────────┘           └─────────┘                   │
//!            │ error                                        │ cancelled || !retry
//!            └──────────────────────────────────────────────┴──────► done
//! ```
//!
//! The session owns at most one connection at a time. Each connection gets
//! a fresh [`RecordDecoder`]; bytes of a record cut off by a disconnect are
//! parsed once at the end of that connection and never carried over.
//!
//! Cancelling through the [`CancelHandle`] clears the liveness flag and
//! wakes the task, which drops the in-flight connection on the spot. A
//! reconnect timer that was already running sees the flag and opens
//! nothing.

use crate::connector::{ChunkStream, Connector, HttpConnector, HttpOptions};
use crate::decode::{DEFAULT_MAX_RECORD_BYTES, RecordDecoder};
use crate::endpoint::EndpointTemplate;
use crate::error::StreamError;
use crate::metrics::{Metrics, with_metrics};
use crate::retry::RetryPolicy;
use livemetrics_core::{MetricRecord, RecordSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// How one connection attempt ended
#[derive(Debug)]
enum Termination {
    /// Remote closed the body
    Closed,
    /// Connect or mid-stream failure
    Failed(StreamError),
    /// Cancel handle invoked (or every handle dropped)
    Cancelled,
}

/// Snapshot of a session's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Connection attempts, including the first
    pub connections: u64,
    /// Reconnect attempts
    pub reconnects: u64,
    /// Records delivered to the sink
    pub records: u64,
    /// Segments discarded as malformed or oversized
    pub malformed: u64,
    /// Attempts that ended in a transport failure
    pub transport_errors: u64,
}

#[derive(Debug, Default)]
struct SessionCounters {
    connections: AtomicU64,
    reconnects: AtomicU64,
    records: AtomicU64,
    malformed: AtomicU64,
    transport_errors: AtomicU64,
}

impl SessionCounters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            connections: self.connections.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// One logical streaming request for a target process
///
/// Settings are fixed once the session starts; configuration changes
/// apply to the next session.
///
/// # Example
///
/// ```ignore
/// let endpoint = EndpointTemplate::https("localhost", 52323)?;
/// let handle = StreamSession::new("4242", &endpoint, RetryPolicy::default())
///     .connect_timeout(Duration::from_secs(5))
///     .start(Arc::new(HttpConnector::new(&HttpOptions::default())?), Arc::new(StdoutSink::new()));
///
/// // later, on teardown
/// handle.cancel();
/// ```
#[derive(Debug, Clone)]
pub struct StreamSession {
    target_id: String,
    url: String,
    retry: RetryPolicy,
    connect_timeout: Option<Duration>,
    max_record_bytes: usize,
}

impl StreamSession {
    /// Describe a session for `target_id` against `endpoint`
    pub fn new(target_id: impl Into<String>, endpoint: &EndpointTemplate, retry: RetryPolicy) -> Self {
        let target_id = target_id.into();
        let url = endpoint.live_metrics_url(&target_id).to_string();
        Self {
            target_id,
            url,
            retry,
            connect_timeout: None,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    /// Give up on a connect that has not produced response headers in time
    ///
    /// A timeout is handled exactly like any other transport failure.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Cap on bytes buffered for one record
    pub fn max_record_bytes(mut self, limit: usize) -> Self {
        self.max_record_bytes = limit;
        self
    }

    /// Target process id
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Resolved stream URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reconnect policy
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Spawn the session task and connect immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, connector: Arc<dyn Connector>, sink: Arc<dyn RecordSink>) -> CancelHandle {
        let active = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(SessionCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            target_id = %self.target_id,
            url = %self.url,
            connector = connector.name(),
            auto_reconnect = self.retry.enabled,
            reconnect_delay_ms = self.retry.delay.as_millis() as u64,
            "Starting stream session"
        );

        let target_id = self.target_id.clone();
        let (done_tx, done_rx) = watch::channel(false);
        let run = self.run(
            connector,
            sink,
            Arc::clone(&active),
            shutdown_rx,
            Arc::clone(&counters),
        );
        tokio::spawn(async move {
            run.await;
            done_tx.send_replace(true);
        });

        CancelHandle {
            inner: Arc::new(SessionControl {
                target_id,
                active,
                shutdown_tx,
                counters,
                done: done_rx,
            }),
        }
    }

    async fn run(
        self,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn RecordSink>,
        active: Arc<AtomicBool>,
        mut shutdown_rx: watch::Receiver<bool>,
        counters: Arc<SessionCounters>,
    ) {
        let _live = LiveGuard::enter(Arc::clone(&active));

        let mut attempt: u64 = 0;
        loop {
            // A reconnect timer that fires after cancel must not connect
            if !active.load(Ordering::SeqCst) {
                break;
            }

            let reconnect = attempt > 0;
            attempt += 1;
            counters.connections.fetch_add(1, Ordering::Relaxed);
            if reconnect {
                counters.reconnects.fetch_add(1, Ordering::Relaxed);
            }
            with_metrics(|m| m.record_connect(reconnect));

            match self
                .attempt(connector.as_ref(), sink.as_ref(), &mut shutdown_rx, &counters)
                .await
            {
                Termination::Cancelled => break,
                Termination::Closed => {
                    info!(target_id = %self.target_id, attempt = attempt, "Metrics stream closed by agent");
                }
                Termination::Failed(e) => {
                    counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                    with_metrics(|m| m.record_transport_error(error_kind(&e)));
                    warn!(
                        target_id = %self.target_id,
                        attempt = attempt,
                        error = %e,
                        "Metrics stream failed"
                    );
                }
            }

            if !active.load(Ordering::SeqCst) {
                break;
            }

            let Some(delay) = self.retry.next_delay() else {
                info!(target_id = %self.target_id, "Auto-reconnect disabled, ending session");
                break;
            };

            debug!(
                target_id = %self.target_id,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let stats = counters.snapshot();
        info!(
            target_id = %self.target_id,
            connections = stats.connections,
            records = stats.records,
            malformed = stats.malformed,
            "Stream session ended"
        );
    }

    /// One connect → receive cycle with a fresh decoder
    async fn attempt(
        &self,
        connector: &dyn Connector,
        sink: &dyn RecordSink,
        shutdown_rx: &mut watch::Receiver<bool>,
        counters: &SessionCounters,
    ) -> Termination {
        debug!(target_id = %self.target_id, url = %self.url, "Connecting");

        let connected = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return Termination::Cancelled,
            connected = self.connect(connector) => connected,
        };

        let mut stream = match connected {
            Ok(stream) => stream,
            Err(e) => return Termination::Failed(e),
        };

        info!(target_id = %self.target_id, "Connected, receiving metrics");

        let mut decoder = RecordDecoder::with_max_record_bytes(self.max_record_bytes);
        loop {
            // Dropping `stream` on cancel closes the connection
            let next = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return Termination::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    decoder.push(&chunk);
                    while let Some(decoded) = decoder.next_record() {
                        self.deliver(decoded, sink, counters);
                    }
                }
                Some(Err(e)) => {
                    self.flush(&mut decoder, sink, counters);
                    return Termination::Failed(e);
                }
                None => {
                    self.flush(&mut decoder, sink, counters);
                    return Termination::Closed;
                }
            }
        }
    }

    async fn connect(&self, connector: &dyn Connector) -> Result<ChunkStream, StreamError> {
        match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connector.connect(&self.url)).await {
                Ok(connected) => connected,
                Err(_) => Err(StreamError::Timeout(limit.as_millis() as u64)),
            },
            None => connector.connect(&self.url).await,
        }
    }

    fn deliver(
        &self,
        decoded: Result<MetricRecord, StreamError>,
        sink: &dyn RecordSink,
        counters: &SessionCounters,
    ) {
        match decoded {
            Ok(record) => {
                counters.records.fetch_add(1, Ordering::Relaxed);
                with_metrics(|m| m.record_delivered());
                sink.on_record(record);
            }
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                with_metrics(|m| m.record_malformed(error_kind(&e)));
                warn!(target_id = %self.target_id, error = %e, "Discarding malformed record");
            }
        }
    }

    /// Parse whatever the connection left behind
    ///
    /// A record cut off mid-way is expected when the stream drops, so a
    /// failed parse here is not counted as malformed.
    fn flush(&self, decoder: &mut RecordDecoder, sink: &dyn RecordSink, counters: &SessionCounters) {
        match decoder.finish() {
            Some(Ok(record)) => self.deliver(Ok(record), sink, counters),
            Some(Err(e)) => {
                debug!(target_id = %self.target_id, error = %e, "Dropping truncated trailing record");
            }
            None => {}
        }
    }
}

/// Start streaming metrics for `target_id` over HTTP(S)
///
/// Connects immediately and keeps reconnecting per `retry` until the
/// returned handle is cancelled. Transport failures never surface here;
/// the only error is failing to build the HTTP client.
///
/// ```ignore
/// let endpoint = EndpointTemplate::https("localhost", 52323)?;
/// let handle = start_streaming("4242", &endpoint, RetryPolicy::default(), |record: MetricRecord| {
///     println!("{record}");
/// })?;
/// ```
pub fn start_streaming<S>(
    target_id: impl Into<String>,
    endpoint: &EndpointTemplate,
    retry: RetryPolicy,
    on_record: S,
) -> crate::error::Result<CancelHandle>
where
    S: RecordSink + 'static,
{
    start_streaming_with(&HttpOptions::default(), target_id, endpoint, retry, on_record)
}

/// [`start_streaming`] with explicit HTTP client options
///
/// Use [`Config::http_options`](crate::Config::http_options) to honour the
/// configured TLS trust setting.
pub fn start_streaming_with<S>(
    options: &HttpOptions,
    target_id: impl Into<String>,
    endpoint: &EndpointTemplate,
    retry: RetryPolicy,
    on_record: S,
) -> crate::error::Result<CancelHandle>
where
    S: RecordSink + 'static,
{
    options.warn_if_relaxed(endpoint);
    let connector = HttpConnector::new(options)?;
    Ok(StreamSession::new(target_id, endpoint, retry).start(Arc::new(connector), Arc::new(on_record)))
}

/// Label for metrics
fn error_kind(e: &StreamError) -> &'static str {
    match e {
        StreamError::Connection(_) => "connection",
        StreamError::Status(_) => "status",
        StreamError::Transport(_) => "transport",
        StreamError::Timeout(_) => "timeout",
        StreamError::Decode(_) => "decode",
        StreamError::Oversized { .. } => "oversized",
    }
}

/// Holds the session live for its task's lifetime
///
/// Dropped on normal exit and when a sink panic unwinds the task, so the
/// liveness flag and the active-sessions gauge never stay raised.
struct LiveGuard {
    active: Arc<AtomicBool>,
    /// Metrics were initialised when the session started
    counted: Option<&'static Metrics>,
}

impl LiveGuard {
    fn enter(active: Arc<AtomicBool>) -> Self {
        let counted = Metrics::get();
        if let Some(metrics) = counted {
            metrics.inc_sessions();
        }
        Self { active, counted }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(metrics) = self.counted {
            metrics.dec_sessions();
        }
    }
}

/// State shared by every clone of a [`CancelHandle`]
struct SessionControl {
    target_id: String,
    active: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    counters: Arc<SessionCounters>,
    /// Flips to `true` when the task exits; closes if it panics
    done: watch::Receiver<bool>,
}

impl SessionControl {
    fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(target_id = %self.target_id, "Cancelling stream session");
        }
        // Wakes the task out of connect, receive or the reconnect sleep
        self.shutdown_tx.send_replace(true);
    }
}

impl Drop for SessionControl {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Handle returned by [`StreamSession::start`]
///
/// `cancel()` is idempotent and safe after the session has already ended.
/// Clones share the session; when the last clone is dropped the session is
/// cancelled, so a host that tears down without calling `cancel()` does
/// not leak a reconnecting task.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<SessionControl>,
}

impl CancelHandle {
    /// Stop the session: no further records, no further connections
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether the session is still connecting, streaming or waiting to reconnect
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Target process id of the session
    pub fn target_id(&self) -> &str {
        &self.inner.target_id
    }

    /// Current counters for this session
    pub fn stats(&self) -> SessionStats {
        self.inner.counters.snapshot()
    }

    /// Wait for the session task to finish
    ///
    /// Cancel-safe, and any number of clones may wait concurrently.
    pub async fn wait(&self) {
        let mut done = self.inner.done.clone();
        if done.wait_for(|finished| *finished).await.is_err() {
            warn!(target_id = %self.inner.target_id, "Stream session task exited abnormally");
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("target_id", &self.inner.target_id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    // ==========================================================================
    // Scripted connector
    // ==========================================================================

    /// What one scripted connection does
    enum Script {
        /// Refuse the connection
        Refuse,
        /// Yield these chunks, then close
        Chunks(Vec<&'static str>),
        /// Yield these chunks, then fail mid-stream
        ChunksThenError(Vec<&'static str>),
        /// Yield these chunks, then never produce anything else
        ChunksThenHang(Vec<&'static str>),
        /// Never produce response headers
        HangOnConnect,
    }

    /// Connector that plays one script per connection, then closes empty
    struct ScriptedConnector {
        scripts: parking_lot::Mutex<VecDeque<Script>>,
        calls: AtomicU32,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: parking_lot::Mutex::new(scripts.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn chunk_stream(chunks: Vec<&'static str>, tail: Option<StreamError>, hang: bool) -> ChunkStream {
        let mut items: Vec<Result<Bytes, StreamError>> =
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        if let Some(e) = tail {
            items.push(Err(e));
        }
        let stream = tokio_stream::iter(items);
        if hang {
            Box::pin(stream.chain(tokio_stream::pending()))
        } else {
            Box::pin(stream)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&self, _url: &str) -> Result<ChunkStream, StreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().pop_front();
            match script {
                Some(Script::Refuse) => Err(StreamError::Connection("refused".into())),
                Some(Script::Chunks(chunks)) => Ok(chunk_stream(chunks, None, false)),
                Some(Script::ChunksThenError(chunks)) => Ok(chunk_stream(
                    chunks,
                    Some(StreamError::Transport("connection reset".into())),
                    false,
                )),
                Some(Script::ChunksThenHang(chunks)) => Ok(chunk_stream(chunks, None, true)),
                Some(Script::HangOnConnect) => std::future::pending().await,
                None => Ok(chunk_stream(vec![], None, false)),
            }
        }
    }

    /// Sink that records every delivered record
    #[derive(Default)]
    struct CaptureSink {
        records: parking_lot::Mutex<Vec<MetricRecord>>,
    }

    impl CaptureSink {
        fn names(&self) -> Vec<String> {
            self.records
                .lock()
                .iter()
                .map(|r| r.name().unwrap_or_default().to_string())
                .collect()
        }
    }

    impl RecordSink for CaptureSink {
        fn on_record(&self, record: MetricRecord) {
            self.records.lock().push(record);
        }
    }

    fn endpoint() -> EndpointTemplate {
        EndpointTemplate::http("localhost", 52325).unwrap()
    }

    fn session(retry: RetryPolicy) -> StreamSession {
        StreamSession::new("4242", &endpoint(), retry)
    }

    // ==========================================================================
    // Construction
    // ==========================================================================

    #[test]
    fn test_session_resolves_url() {
        let s = session(RetryPolicy::default());
        assert_eq!(s.target_id(), "4242");
        assert_eq!(s.url(), "http://localhost:52325/livemetrics?pid=4242");
        assert_eq!(s.retry_policy(), RetryPolicy::default());
    }

    // ==========================================================================
    // Delivery
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_records_split_across_chunks_are_delivered_in_order() {
        let connector = ScriptedConnector::new(vec![Script::Chunks(vec![
            "{\"name\":\"working-set\",\"value\":123.4}\x1e{\"name\":\"gc-heap",
            "-size\",\"value\":45.6}\x1e",
        ])]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::disabled()).start(connector.clone(), sink.clone());
        handle.wait().await;

        let records = sink.records.lock().clone();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), Some("working-set"));
        assert_eq!(records[0].value(), Some(123.4));
        assert_eq!(records[1].name(), Some("gc-heap-size"));
        assert_eq!(records[1].value(), Some(45.6));
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_record_does_not_end_connection() {
        let connector = ScriptedConnector::new(vec![Script::Chunks(vec![
            "{\"name\":\"a\",\"value\":1}\x1e{broken\x1e",
            "{\"name\":\"b\",\"value\":2}\x1e",
        ])]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::disabled()).start(connector.clone(), sink.clone());
        handle.wait().await;

        assert_eq!(sink.names(), vec!["a", "b"]);
        let stats = handle.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.transport_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_record_emitted_on_clean_close() {
        let connector = ScriptedConnector::new(vec![Script::Chunks(vec![
            "{\"name\":\"a\",\"value\":1}\x1e{\"name\":\"cpu-usage\",\"value\":0.12}",
        ])]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::disabled()).start(connector.clone(), sink.clone());
        handle.wait().await;

        assert_eq!(sink.names(), vec!["a", "cpu-usage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_trailing_record_is_dropped_silently() {
        let connector = ScriptedConnector::new(vec![Script::ChunksThenError(vec![
            "{\"name\":\"a\",\"value\":1}\x1e{\"name\":\"cpu-us",
        ])]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::disabled()).start(connector.clone(), sink.clone());
        handle.wait().await;

        assert_eq!(sink.names(), vec!["a"]);
        let stats = handle.stats();
        assert_eq!(stats.malformed, 0);
        assert_eq!(stats.transport_errors, 1);
    }

    // ==========================================================================
    // Reconnect
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_drop_mid_stream_flushes_then_reconnects_after_delay() {
        let connector = ScriptedConnector::new(vec![
            Script::ChunksThenError(vec!["{\"name\":\"cpu-usage\",\"value\":0.12}"]),
            Script::ChunksThenHang(vec!["{\"name\":\"after\",\"value\":1}\x1e"]),
        ]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_millis(500)))
            .start(connector.clone(), sink.clone());

        // First connection ran and failed; reconnect is pending
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.calls(), 1);
        assert_eq!(sink.names(), vec!["cpu-usage"]);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.calls(), 2);
        assert_eq!(sink.names(), vec!["cpu-usage", "after"]);

        let stats = handle.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.reconnects, 1);

        handle.cancel();
        handle.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_close_and_refusal_both_reconnect() {
        let connector = ScriptedConnector::new(vec![
            Script::Chunks(vec!["{\"name\":\"a\",\"value\":1}\x1e"]),
            Script::Refuse,
            Script::Refuse,
            Script::ChunksThenHang(vec!["{\"name\":\"b\",\"value\":2}\x1e"]),
        ]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_millis(10)))
            .start(connector.clone(), sink.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(connector.calls(), 4);
        assert_eq!(sink.names(), vec!["a", "b"]);
        assert_eq!(handle.stats().transport_errors, 2);
        assert!(handle.is_active());

        handle.cancel();
        handle.wait().await;
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_record_is_not_carried_across_reconnect() {
        let connector = ScriptedConnector::new(vec![
            Script::ChunksThenError(vec!["{\"name\":\"spl"]),
            Script::ChunksThenHang(vec!["it\",\"value\":1}\x1e{\"name\":\"b\",\"value\":2}\x1e"]),
        ]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_millis(10)))
            .start(connector.clone(), sink.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;

        // The second connection's leading fragment is malformed on its own
        assert_eq!(sink.names(), vec!["b"]);
        assert_eq!(handle.stats().malformed, 1);

        handle.cancel();
        handle.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_disabled_ends_after_first_connection() {
        let connector = ScriptedConnector::new(vec![Script::Refuse]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::disabled()).start(connector.clone(), sink.clone());
        handle.wait().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.calls(), 1);
        assert!(!handle.is_active());

        // Cancelling a finished session is a no-op
        handle.cancel();
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_routes_to_reconnect() {
        let connector = ScriptedConnector::new(vec![
            Script::HangOnConnect,
            Script::ChunksThenHang(vec!["{\"name\":\"a\",\"value\":1}\x1e"]),
        ]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_millis(100)))
            .connect_timeout(Duration::from_secs(1))
            .start(connector.clone(), sink.clone());

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(connector.calls(), 2);
        assert_eq!(sink.names(), vec!["a"]);
        assert_eq!(handle.stats().transport_errors, 1);

        handle.cancel();
        handle.wait().await;
    }

    // ==========================================================================
    // Cancellation
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_reconnect_delay_opens_no_connection() {
        let connector = ScriptedConnector::new(vec![Script::Refuse]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_secs(1)))
            .start(connector.clone(), sink.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.calls(), 1);

        handle.cancel();
        assert!(!handle.is_active());

        // Well past the point where the reconnect timer would have fired
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.wait().await;
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_live_connection() {
        let connector = ScriptedConnector::new(vec![Script::ChunksThenHang(vec![
            "{\"name\":\"a\",\"value\":1}\x1e{\"name\":\"partial\"",
        ])]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::ZERO))
            .start(connector.clone(), sink.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.names(), vec!["a"]);

        handle.cancel();
        handle.wait().await;

        // No reconnect, and the buffered partial is not emitted after cancel
        assert_eq!(connector.calls(), 1);
        assert_eq!(sink.names(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_connecting() {
        let connector = ScriptedConnector::new(vec![Script::HangOnConnect]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::default()).start(connector.clone(), sink.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.cancel();
        handle.wait().await;

        assert_eq!(connector.calls(), 1);
        assert_eq!(handle.stats().connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_cancels_session() {
        let connector = ScriptedConnector::new(vec![Script::Refuse]);
        let sink = Arc::new(CaptureSink::default());

        let handle = session(RetryPolicy::constant(Duration::from_millis(50)))
            .start(connector.clone(), sink.clone());
        let clone = handle.clone();

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        assert!(clone.is_active());
        drop(clone);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_are_independent() {
        let first = ScriptedConnector::new(vec![Script::ChunksThenHang(vec!["{\"name\":\"one"])]);
        let second = ScriptedConnector::new(vec![Script::ChunksThenHang(vec![
            "\",\"value\":1}\x1e{\"name\":\"two\",\"value\":2}\x1e",
        ])]);
        let sink_a = Arc::new(CaptureSink::default());
        let sink_b = Arc::new(CaptureSink::default());

        let a = session(RetryPolicy::default()).start(first, sink_a.clone());
        let b = StreamSession::new("7", &endpoint(), RetryPolicy::default()).start(second, sink_b.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        a.cancel();
        assert!(b.is_active());

        assert!(sink_a.names().is_empty());
        assert_eq!(sink_b.names(), vec!["two"]);
        assert_eq!(b.stats().malformed, 1);

        b.cancel();
        a.wait().await;
        b.wait().await;
    }

    // ==========================================================================
    // Sink failure
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_ends_session_cleanly() {
        let connector = ScriptedConnector::new(vec![Script::ChunksThenHang(vec![
            "{\"name\":\"a\",\"value\":1}\x1e{\"name\":\"boom\",\"value\":2}\x1e",
        ])]);
        let sink = Arc::new(|record: MetricRecord| {
            if record.name() == Some("boom") {
                panic!("sink rejected record");
            }
        });

        let handle = session(RetryPolicy::constant(Duration::ZERO)).start(connector.clone(), sink);

        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();

        assert!(!handle.is_active());
        assert_eq!(connector.calls(), 1);
        assert_eq!(handle.stats().records, 2);
    }

    #[test]
    fn test_live_guard_releases_on_unwind() {
        Metrics::init().unwrap();
        let active = Arc::new(AtomicBool::new(true));
        let guard = LiveGuard::enter(Arc::clone(&active));
        assert!(guard.counted.is_some());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("unwind through the session task");
        }));

        assert!(result.is_err());
        assert!(!active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_live_guard_skips_gauge_when_metrics_absent_at_start() {
        let active = Arc::new(AtomicBool::new(true));
        let guard = LiveGuard {
            active: Arc::clone(&active),
            counted: None,
        };
        drop(guard);
        assert!(!active.load(Ordering::SeqCst));
    }
}
