//! Headless browser launch helpers.

use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{CdpError, Result};
use crate::probe::fetch_version_on_port;
use crate::types::VersionInfo;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Remote debugging port the browser should listen on.
    pub port: u16,
    /// Explicit executable path; discovered from well-known locations when unset.
    pub executable: Option<String>,
    pub headless: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            port: 9222,
            executable: None,
            headless: true,
        }
    }
}

/// Locates a Chromium-family executable on this machine.
pub fn find_browser_executable() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &["chrome.exe", "msedge.exe"]
    } else {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    };

    for candidate in candidates {
        if candidate.starts_with('/') {
            if std::path::Path::new(candidate).exists() {
                return Some((*candidate).to_string());
            }
        } else if which::which(candidate).is_ok() {
            return Some((*candidate).to_string());
        }
    }

    None
}

/// Spawns a browser with remote debugging enabled and waits for the
/// endpoint to answer. The returned profile directory must outlive the child.
pub async fn launch(opts: &LaunchOptions) -> Result<(Child, TempDir, VersionInfo)> {
    let executable = match &opts.executable {
        Some(path) => path.clone(),
        None => find_browser_executable().ok_or_else(|| {
            CdpError::Launch("no Chrome/Chromium executable found on this machine".into())
        })?,
    };

    let profile = TempDir::new()?;
    let mut args = vec![
        format!("--remote-debugging-port={}", opts.port),
        format!("--user-data-dir={}", profile.path().display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
    ];
    if opts.headless {
        args.push("--headless=new".to_string());
    }

    debug!(target = "cdp", %executable, port = opts.port, "launching browser");
    let mut child = Command::new(&executable)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CdpError::Launch(format!("failed to spawn {executable}: {e}")))?;

    let max_attempts = 40u32;
    let mut last_error = "endpoint not reachable".to_string();
    for _ in 0..max_attempts {
        tokio::time::sleep(Duration::from_millis(250)).await;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(CdpError::Launch(format!(
                "browser exited before the debugging endpoint came up (status: {status})"
            )));
        }

        match fetch_version_on_port(opts.port).await {
            Ok(info) => return Ok((child, profile, info)),
            Err(e) => last_error = e.to_string(),
        }
    }

    let _ = child.kill().await;
    Err(CdpError::Launch(format!(
        "browser launched but port {} never answered: {last_error}",
        opts.port
    )))
}
