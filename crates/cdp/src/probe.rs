//! DevTools endpoint probing.

use std::time::Duration;

use crate::error::{CdpError, Result};
use crate::types::VersionInfo;

/// Fetches `/json/version` from an explicit debug endpoint such as
/// `http://127.0.0.1:9222`.
pub async fn fetch_version(endpoint: &str) -> Result<VersionInfo> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(400))
        .build()
        .map_err(|e| CdpError::Endpoint(format!("failed to create HTTP client: {e}")))?;

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| CdpError::Endpoint(format!("{url}: {e}")))?;

    if !response.status().is_success() {
        return Err(CdpError::Endpoint(format!(
            "{url}: unexpected status {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| CdpError::Endpoint(format!("{url}: invalid version payload: {e}")))
}

/// Probes the loopback interfaces for a browser debugging on `port`.
pub async fn fetch_version_on_port(port: u16) -> Result<VersionInfo> {
    let mut last_error = "no response".to_string();

    for host in ["127.0.0.1", "localhost", "[::1]"] {
        match fetch_version(&format!("http://{host}:{port}")).await {
            Ok(info) => return Ok(info),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(CdpError::Endpoint(format!(
        "no devtools endpoint on port {port}: {last_error}"
    )))
}
