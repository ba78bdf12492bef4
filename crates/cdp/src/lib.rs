//! Minimal Chrome DevTools Protocol driver.
//!
//! Covers exactly what an unattended panel-automation run needs: discover or
//! launch a headless Chromium, attach to page targets, navigate, evaluate
//! DOM expressions, manage cookies, and capture screenshots. Everything is
//! command/response over the devtools WebSocket; protocol events are traced
//! and dropped.

pub mod browser;
pub mod connection;
pub mod error;
pub mod launcher;
pub mod page;
pub mod probe;
pub mod types;

pub use browser::Browser;
pub use error::{CdpError, Result};
pub use launcher::LaunchOptions;
pub use page::Page;
pub use types::{Cookie, SameSite, VersionInfo};
