//! The browser-driver seam.
//!
//! The orchestrator only talks to these traits; `cdp` adapts them onto the
//! devtools driver, and the integration tests substitute scripted fakes.

pub mod cdp;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use keeper_cdp::Cookie;

use crate::error::Result;

pub use cdp::CdpPanel;

/// State of a located action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub disabled: bool,
}

/// One browser instance for the whole run.
#[async_trait]
pub trait Panel: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PanelPage>>;
    async fn close(&self) -> Result<()>;
}

/// One page, opened per attempt and closed on every exit path.
#[async_trait]
pub trait PanelPage: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;
    async fn current_url(&self) -> Result<String>;

    async fn add_session_cookie(&self, cookie: &Cookie) -> Result<()>;
    async fn clear_cookies(&self) -> Result<()>;
    /// Value of the named cookie as it would be sent to `url`, if present.
    async fn read_cookie(&self, name: &str, url: &str) -> Result<Option<String>>;

    /// Waits until `selector` matches an element, bounded by `timeout`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;

    /// Inner text of the first element matching `selector`, if any.
    async fn element_text(&self, selector: &str) -> Result<Option<String>>;

    /// Finds a button by its visible label, waiting up to `timeout` for it
    /// to appear. `None` means it never showed up.
    async fn find_labeled_button(
        &self,
        label: &str,
        timeout: Duration,
    ) -> Result<Option<ButtonState>>;
    async fn click_labeled_button(&self, label: &str) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;
    async fn close(&self) -> Result<()>;
}
