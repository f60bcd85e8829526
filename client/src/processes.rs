//! Process listing
//!
//! One-shot `GET /processes` against the agent, used to pick a target
//! before a stream session starts.

use crate::endpoint::EndpointTemplate;
use crate::error::{Result, StreamError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A process the agent can attach to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Operating system process id, used as the stream target
    pub pid: u32,
    /// Process name
    #[serde(default)]
    pub name: String,
    /// The agent's preselected process
    #[serde(default, rename = "isDefault")]
    pub is_default: bool,
    /// Any other fields the agent reports (uid, command line, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// List the processes visible to the agent
///
/// # Errors
/// - `LiveMetricsError::Stream(StreamError::Status)` - non-2xx response
/// - `LiveMetricsError::Http` - connect failure or an unparsable body
pub async fn list_processes(client: &Client, endpoint: &EndpointTemplate) -> Result<Vec<ProcessInfo>> {
    let url = endpoint.processes_url();
    debug!(url = %url, "Listing processes");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()).into());
    }

    Ok(response.json::<Vec<ProcessInfo>>().await?)
}
