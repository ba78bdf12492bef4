//! Adapter from the panel traits onto the devtools driver.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use keeper_cdp::{Browser, Cookie, LaunchOptions, Page};

use super::{ButtonState, Panel, PanelPage};
use crate::error::{Error, Result};

pub struct CdpPanel {
    browser: Browser,
}

impl CdpPanel {
    pub async fn launch(port: u16) -> Result<Self> {
        let browser = Browser::launch(&LaunchOptions {
            port,
            ..Default::default()
        })
        .await?;
        Ok(Self { browser })
    }

    pub async fn connect(endpoint: &str) -> Result<Self> {
        let browser = Browser::connect(endpoint).await?;
        Ok(Self { browser })
    }
}

#[async_trait]
impl Panel for CdpPanel {
    async fn new_page(&self) -> Result<Box<dyn PanelPage>> {
        let page = self.browser.new_page().await?;
        Ok(Box::new(CdpPanelPage { page }))
    }

    async fn close(&self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

pub struct CdpPanelPage {
    page: Page,
}

/// Embeds a string into a page expression without breaking out of it.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression locating a button whose visible text contains `label`.
fn labeled_button_expr(label: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll('button')).find(b => (b.textContent || '').trim().includes({}))",
        js_string(label)
    )
}

#[async_trait]
impl PanelPage for CdpPanelPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.page.navigate(url, timeout).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn add_session_cookie(&self, cookie: &Cookie) -> Result<()> {
        self.page.set_cookie(cookie).await?;
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.page.clear_cookies().await?;
        Ok(())
    }

    async fn read_cookie(&self, name: &str, url: &str) -> Result<Option<String>> {
        let cookies = self.page.cookies(url).await?;
        Ok(cookies.into_iter().find(|c| c.name == name).map(|c| c.value))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let expr = format!("document.querySelector({}) !== null", js_string(selector));
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.evaluate(&expr).await? == serde_json::Value::Bool(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    ms: timeout.as_millis() as u64,
                    what: format!("selector {selector}"),
                });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value),
        );
        if self.page.evaluate(&expr).await? != serde_json::Value::Bool(true) {
            return Err(Error::Interaction(format!(
                "no element matches {selector} to fill"
            )));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let expr = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector),
        );
        if self.page.evaluate(&expr).await? != serde_json::Value::Bool(true) {
            return Err(Error::Interaction(format!(
                "no element matches {selector} to click"
            )));
        }
        Ok(())
    }

    async fn element_text(&self, selector: &str) -> Result<Option<String>> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerText.trim() : null; }})()",
            js_string(selector)
        );
        Ok(self
            .page
            .evaluate(&expr)
            .await?
            .as_str()
            .map(str::to_string))
    }

    async fn find_labeled_button(
        &self,
        label: &str,
        timeout: Duration,
    ) -> Result<Option<ButtonState>> {
        let expr = format!(
            r#"(() => {{
                const btn = {find};
                if (!btn) return null;
                return {{ disabled: btn.disabled || btn.hasAttribute('disabled') }};
            }})()"#,
            find = labeled_button_expr(label),
        );

        let deadline = Instant::now() + timeout;
        loop {
            let value = self.page.evaluate(&expr).await?;
            if let Some(disabled) = value.get("disabled").and_then(|v| v.as_bool()) {
                return Ok(Some(ButtonState { disabled }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn click_labeled_button(&self, label: &str) -> Result<()> {
        let expr = format!(
            r#"(() => {{
                const btn = {find};
                if (!btn) return false;
                btn.click();
                return true;
            }})()"#,
            find = labeled_button_expr(label),
        );
        if self.page.evaluate(&expr).await? != serde_json::Value::Bool(true) {
            return Err(Error::Interaction(format!(
                "button labeled {label:?} vanished before it could be clicked"
            )));
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page.screenshot_to_file(path).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_backslashes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js_string(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn labeled_button_expr_embeds_label_verbatim() {
        let expr = labeled_button_expr("ADD 6H");
        assert!(expr.contains("\"ADD 6H\""));
        assert!(expr.contains("querySelectorAll('button')"));
    }
}
