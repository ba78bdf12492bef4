use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{CdpError, Result};
use crate::types::Cookie;

/// One attached page target.
pub struct Page {
    connection: Arc<Connection>,
    target_id: String,
    session_id: String,
}

impl Page {
    pub(crate) fn new(connection: Arc<Connection>, target_id: String, session_id: String) -> Self {
        Self {
            connection,
            target_id,
            session_id,
        }
    }

    pub(crate) async fn enable_domains(&self) -> Result<()> {
        self.send("Page.enable", json!({})).await?;
        self.send("Runtime.enable", json!({})).await?;
        self.send("Network.enable", json!({})).await?;
        Ok(())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.connection
            .send(Some(&self.session_id), method, params)
            .await
    }

    /// Navigates and waits for the document to finish loading, bounded by
    /// `timeout`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!(target = "cdp", %url, "navigate");
        let result = self.send("Page.navigate", json!({"url": url})).await?;
        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(CdpError::Protocol {
                    method: "Page.navigate".into(),
                    message: format!("{url}: {error_text}"),
                });
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let state = self.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CdpError::Timeout {
                    ms: timeout.as_millis() as u64,
                    what: format!("load of {url}"),
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Current page URL as the document sees it.
    pub async fn url(&self) -> Result<String> {
        let value = self.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CdpError::Protocol {
                method: "Runtime.evaluate".into(),
                message: "location.href was not a string".into(),
            })
    }

    /// Evaluates an expression and returns its value. Page-side exceptions
    /// become [`CdpError::Script`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown page exception");
            return Err(CdpError::Script(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    pub async fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        let result = self
            .send("Network.setCookie", serde_json::to_value(cookie)?)
            .await?;
        if result["success"] == Value::Bool(false) {
            return Err(CdpError::Protocol {
                method: "Network.setCookie".into(),
                message: format!("browser rejected cookie {}", cookie.name),
            });
        }
        Ok(())
    }

    pub async fn clear_cookies(&self) -> Result<()> {
        self.send("Network.clearBrowserCookies", json!({})).await?;
        Ok(())
    }

    /// Cookies that would be sent to `url`.
    pub async fn cookies(&self, url: &str) -> Result<Vec<Cookie>> {
        let result = self
            .send("Network.getCookies", json!({"urls": [url]}))
            .await?;
        let cookies = result["cookies"].clone();
        Ok(serde_json::from_value(cookies)?)
    }

    /// Captures a PNG screenshot of the viewport into `path`.
    pub async fn screenshot_to_file(&self, path: &Path) -> Result<()> {
        let result = self
            .send("Page.captureScreenshot", json!({"format": "png"}))
            .await?;
        let data = result["data"].as_str().ok_or_else(|| CdpError::Protocol {
            method: "Page.captureScreenshot".into(),
            message: "response missing image data".into(),
        })?;
        let bytes = BASE64.decode(data).map_err(|e| CdpError::Protocol {
            method: "Page.captureScreenshot".into(),
            message: format!("invalid base64 image data: {e}"),
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, bytes).await?;
        debug!(target = "cdp", path = %path.display(), "screenshot saved");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.connection
            .send(
                None,
                "Target.closeTarget",
                json!({"targetId": self.target_id}),
            )
            .await?;
        Ok(())
    }
}
