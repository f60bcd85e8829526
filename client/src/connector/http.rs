//! HTTP connector
//!
//! Issues the GET and streams the body through reqwest. For HTTPS the
//! local agent usually presents a self-signed certificate, so validation
//! is relaxed unless [`HttpOptions::accept_invalid_certs`] is turned off.

use super::{ChunkStream, Connector};
use crate::endpoint::EndpointTemplate;
use crate::error::{LiveMetricsError, Result, StreamError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Default TCP connect timeout
pub(crate) const DEFAULT_TCP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Options for building the HTTP client
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Accept self-signed / invalid TLS certificates from the agent
    pub accept_invalid_certs: bool,
    /// TCP connect timeout (does not bound the stream itself)
    pub tcp_connect_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            tcp_connect_timeout: Duration::from_secs(DEFAULT_TCP_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl HttpOptions {
    /// Build a reqwest client from these options
    ///
    /// No overall request timeout is set: the metrics response never ends
    /// on its own.
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .connect_timeout(self.tcp_connect_timeout)
            .build()
            .map_err(LiveMetricsError::Http)
    }

    /// Whether certificate validation is actually skipped for `endpoint`
    ///
    /// Plain HTTP has no certificate, so the setting only matters for HTTPS.
    pub fn relaxes_tls_for(&self, endpoint: &EndpointTemplate) -> bool {
        self.accept_invalid_certs && endpoint.is_https()
    }

    /// Log once when `endpoint` will be trusted without validation
    pub fn warn_if_relaxed(&self, endpoint: &EndpointTemplate) {
        if self.relaxes_tls_for(endpoint) {
            warn!(endpoint = %endpoint, "TLS certificate validation disabled for the monitoring agent");
        }
    }
}

/// reqwest-based connector for the agent's live metrics endpoint
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Create a connector with its own client
    pub fn new(options: &HttpOptions) -> Result<Self> {
        Ok(Self {
            client: options.build_client()?,
        })
    }

    /// Share an existing client (e.g. with the process listing)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying reqwest client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn connect(&self, url: &str) -> std::result::Result<ChunkStream, StreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        debug!(url = url, status = status.as_u16(), "metrics stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Transport(e.to_string())));

        Ok(Box::pin(body))
    }
}
