//! Agent endpoint resolution
//!
//! The agent listens on `{scheme}://{host}:{port}`. Two resources matter:
//!
//! - `GET /livemetrics?pid={target}` - the Record Separator metrics stream
//! - `GET /processes` - the processes the agent can attach to

use crate::error::{LiveMetricsError, Result};
use reqwest::Url;
use std::fmt;

/// Path of the live metrics stream
pub const LIVE_METRICS_PATH: &str = "/livemetrics";

/// Path of the process listing
pub const PROCESSES_PATH: &str = "/processes";

/// URL scheme of the agent endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTPS, usually with the agent's self-signed certificate
    Https,
}

impl Scheme {
    /// Scheme as it appears in a URL
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base address of a monitoring agent
///
/// Resolves the per-target stream URL by substituting the target id into
/// the `pid` query parameter.
///
/// ```
/// use livemetrics_client::EndpointTemplate;
///
/// # fn main() -> livemetrics_client::Result<()> {
/// let endpoint = EndpointTemplate::http("localhost", 52325)?;
/// assert_eq!(
///     endpoint.live_metrics_url("4242").as_str(),
///     "http://localhost:52325/livemetrics?pid=4242"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    scheme: Scheme,
    host: String,
    port: u16,
    base: Url,
}

impl EndpointTemplate {
    /// Build from parts; fails only for a host that is not a valid URL host
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        let raw = format!("{scheme}://{host}:{port}");
        let base = Url::parse(&raw).map_err(|e| LiveMetricsError::Endpoint {
            endpoint: raw.clone(),
            reason: e.to_string(),
        })?;
        if base.host_str().is_none() || base.path() != "/" {
            return Err(LiveMetricsError::Endpoint {
                endpoint: raw,
                reason: "expected a bare host name".to_string(),
            });
        }
        Ok(Self {
            scheme,
            host,
            port,
            base,
        })
    }

    /// Plain HTTP endpoint
    pub fn http(host: &str, port: u16) -> Result<Self> {
        Self::new(Scheme::Http, host, port)
    }

    /// HTTPS endpoint
    pub fn https(host: &str, port: u16) -> Result<Self> {
        Self::new(Scheme::Https, host, port)
    }

    /// Parse a base URL such as `https://localhost:52323`
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |reason: &str| LiveMetricsError::Endpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => return Err(invalid("unsupported scheme (expected http or https)")),
        };
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Self::new(scheme, host, port)
    }

    /// Endpoint scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Endpoint host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Endpoint port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the endpoint uses TLS
    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Stream URL for one target process
    pub fn live_metrics_url(&self, target_id: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(LIVE_METRICS_PATH);
        url.query_pairs_mut().append_pair("pid", target_id);
        url
    }

    /// Process listing URL
    pub fn processes_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path(PROCESSES_PATH);
        url
    }
}

impl fmt::Display for EndpointTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
