use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{CdpError, Result};
use crate::launcher::{LaunchOptions, launch};
use crate::page::Page;
use crate::probe::fetch_version;

/// A running browser reachable over the DevTools protocol.
///
/// Owns the devtools connection and, when launched by us, the browser
/// process and its throwaway profile directory. `close` tears everything
/// down; call it exactly once at the end of a run.
pub struct Browser {
    connection: Arc<Connection>,
    child: Mutex<Option<Child>>,
    _profile: Option<TempDir>,
}

impl Browser {
    /// Launches a headless browser and connects to it.
    pub async fn launch(opts: &LaunchOptions) -> Result<Self> {
        let (child, profile, info) = launch(opts).await?;
        debug!(
            target = "cdp",
            browser = info.browser.as_deref().unwrap_or("<unknown>"),
            "browser ready"
        );
        let connection = Connection::connect(&info.web_socket_debugger_url).await?;
        Ok(Self {
            connection,
            child: Mutex::new(Some(child)),
            _profile: Some(profile),
        })
    }

    /// Attaches to an already-running browser via its debug HTTP endpoint,
    /// e.g. `http://127.0.0.1:9222`.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let info = fetch_version(endpoint).await?;
        let connection = Connection::connect(&info.web_socket_debugger_url).await?;
        Ok(Self {
            connection,
            child: Mutex::new(None),
            _profile: None,
        })
    }

    /// Opens a fresh page target and attaches to it.
    pub async fn new_page(&self) -> Result<Page> {
        let created = self
            .connection
            .send(None, "Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| CdpError::Protocol {
                method: "Target.createTarget".into(),
                message: "response missing targetId".into(),
            })?
            .to_string();

        let attached = self
            .connection
            .send(
                None,
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::Protocol {
                method: "Target.attachToTarget".into(),
                message: "response missing sessionId".into(),
            })?
            .to_string();

        let page = Page::new(Arc::clone(&self.connection), target_id, session_id);
        page.enable_domains().await?;
        Ok(page)
    }

    /// Closes the browser and, for launched instances, reaps the process.
    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.connection.send(None, "Browser.close", json!({})).await {
            warn!(target = "cdp", error = %e, "Browser.close failed");
        }
        self.connection.shutdown().await;

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(target = "cdp", error = %e, "failed to kill browser process");
            }
            let _ = child.wait().await;
        }
        Ok(())
    }
}
