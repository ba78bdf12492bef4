//! End-to-end orchestrator behavior against a scripted fake panel.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keeper_cdp::Cookie;
use keeper_cli::config::{Credentials, Login, RenewConfig};
use keeper_cli::error::{Error, Result};
use keeper_cli::panel::{ButtonState, Panel, PanelPage};
use keeper_cli::renew::{self, Renewal};
use keeper_cli::secrets::SecretSink;

const SERVER_URL: &str = "https://panel.example/server/abc123";
const LOGIN_URL: &str = "https://panel.example/auth/login";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Button {
    Enabled,
    Disabled,
    Absent,
}

struct FakeState {
    token_valid: bool,
    password_valid: bool,
    button: Button,
    nav_fails: bool,
    click_fails: bool,
    login_error_banner: Option<String>,

    authed: bool,
    current_url: String,

    pages_opened: u32,
    pages_closed: u32,
    fills: u32,
    clicks: u32,
    cookies_cleared: u32,
    screenshots: Vec<String>,
}

impl FakeState {
    fn new() -> Self {
        Self {
            token_valid: false,
            password_valid: false,
            button: Button::Enabled,
            nav_fails: false,
            click_fails: false,
            login_error_banner: None,
            authed: false,
            current_url: "about:blank".into(),
            pages_opened: 0,
            pages_closed: 0,
            fills: 0,
            clicks: 0,
            cookies_cleared: 0,
            screenshots: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct FakePanel {
    state: Arc<Mutex<FakeState>>,
}

impl FakePanel {
    fn new(configure: impl FnOnce(&mut FakeState)) -> Self {
        let mut state = FakeState::new();
        configure(&mut state);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

#[async_trait]
impl Panel for FakePanel {
    async fn new_page(&self) -> Result<Box<dyn PanelPage>> {
        let mut state = self.state.lock().unwrap();
        state.pages_opened += 1;
        state.authed = false;
        state.current_url = "about:blank".into();
        Ok(Box::new(FakePage {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl PanelPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.nav_fails {
            return Err(Error::Timeout {
                ms: 60_000,
                what: format!("load of {url}"),
            });
        }
        state.current_url = if url == SERVER_URL && !state.authed {
            LOGIN_URL.to_string()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn add_session_cookie(&self, _cookie: &Cookie) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.token_valid {
            state.authed = true;
        }
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cookies_cleared += 1;
        state.authed = false;
        Ok(())
    }

    async fn read_cookie(&self, _name: &str, _url: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.authed.then(|| "rotated-token-value".to_string()))
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
        self.state.lock().unwrap().fills += 1;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if selector.contains("submit") && state.password_valid {
            state.authed = true;
            state.current_url = SERVER_URL.to_string();
        }
        Ok(())
    }

    async fn element_text(&self, _selector: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().login_error_banner.clone())
    }

    async fn find_labeled_button(
        &self,
        _label: &str,
        _timeout: Duration,
    ) -> Result<Option<ButtonState>> {
        let state = self.state.lock().unwrap();
        Ok(match state.button {
            Button::Enabled => Some(ButtonState { disabled: false }),
            Button::Disabled => Some(ButtonState { disabled: true }),
            Button::Absent => None,
        })
    }

    async fn click_labeled_button(&self, label: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.click_fails {
            return Err(Error::Interaction(format!(
                "button labeled {label:?} vanished before it could be clicked"
            )));
        }
        state.clicks += 1;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.state.lock().unwrap().screenshots.push(name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().pages_closed += 1;
        Ok(())
    }
}

#[derive(Default)]
struct CountingSink {
    updates: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl SecretSink for CountingSink {
    async fn update(&self, name: &str, value: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        if self.fail {
            return Err(Error::Rotation("store rejected the value".into()));
        }
        Ok(())
    }
}

fn test_config(credentials: Credentials) -> RenewConfig {
    RenewConfig {
        server_url: SERVER_URL.into(),
        login_url: LOGIN_URL.into(),
        max_retries: 3,
        credentials,
        button_label: "ADD 6H".into(),
        cookie_name: "remember_web".into(),
        cookie_domain: ".panel.example".into(),
        secret_name: "REMEMBER_WEB_COOKIE".into(),
        screenshot_dir: std::env::temp_dir(),
        nav_timeout: Duration::from_millis(50),
        selector_timeout: Duration::from_millis(50),
        retry_delay: Duration::from_millis(1),
        settle_delay: Duration::from_millis(1),
    }
}

fn token_credentials() -> Credentials {
    Credentials {
        session_token: Some("stored-token".into()),
        login: None,
    }
}

fn full_credentials() -> Credentials {
    Credentials {
        session_token: Some("stored-token".into()),
        login: Some(Login {
            email: "user@example.com".into(),
            password: "hunter2".into(),
        }),
    }
}

#[tokio::test]
async fn no_credentials_fails_before_any_browser_call() {
    let panel = FakePanel::new(|_| {});
    let cfg = test_config(Credentials::default());

    let err = renew::run(&panel, None, &cfg).await.unwrap_err();
    assert!(matches!(err, Error::NoCredentials));

    let state = panel.state.lock().unwrap();
    assert_eq!(state.pages_opened, 0);
}

#[tokio::test]
async fn stored_token_authenticates_and_rotates_once() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Enabled;
    });
    let sink = CountingSink::default();
    let cfg = test_config(token_credentials());

    let outcome = renew::run(&panel, Some(&sink), &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::Extended);

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "REMEMBER_WEB_COOKIE");
    assert_eq!(updates[0].1, "rotated-token-value");

    let state = panel.state.lock().unwrap();
    assert_eq!(state.fills, 0, "password path must not run");
    assert_eq!(state.pages_opened, 1);
    assert_eq!(state.pages_closed, 1);
}

#[tokio::test]
async fn invalid_token_falls_back_to_password_login() {
    let panel = FakePanel::new(|s| {
        s.token_valid = false;
        s.password_valid = true;
    });
    let sink = CountingSink::default();
    let cfg = test_config(full_credentials());

    let outcome = renew::run(&panel, Some(&sink), &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::Extended);

    let state = panel.state.lock().unwrap();
    assert_eq!(state.cookies_cleared, 1, "rejected token clears the jar");
    assert_eq!(state.fills, 2, "email and password fields filled");
    assert_eq!(sink.updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn enabled_button_is_clicked_exactly_once() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Enabled;
    });
    let cfg = test_config(token_credentials());

    let outcome = renew::run(&panel, None, &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::Extended);
    assert_eq!(panel.state.lock().unwrap().clicks, 1);
}

#[tokio::test]
async fn disabled_button_is_success_without_clicking() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Disabled;
    });
    let cfg = test_config(token_credentials());

    let outcome = renew::run(&panel, None, &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::NotNeeded);

    let state = panel.state.lock().unwrap();
    assert_eq!(state.clicks, 0);
    assert!(state.screenshots.contains(&"button_disabled.png".to_string()));
}

#[tokio::test]
async fn absent_button_is_success() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Absent;
    });
    let cfg = test_config(token_credentials());

    let outcome = renew::run(&panel, None, &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::ButtonUnavailable);
    assert_eq!(panel.state.lock().unwrap().clicks, 0);
}

#[tokio::test]
async fn failed_password_login_exhausts_retries() {
    let panel = FakePanel::new(|s| {
        s.token_valid = false;
        s.password_valid = false;
    });
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(full_credentials());
    cfg.screenshot_dir = dir.path().to_path_buf();

    let err = renew::run(&panel, None, &cfg).await.unwrap_err();
    match err {
        Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other}"),
    }

    let state = panel.state.lock().unwrap();
    assert_eq!(state.fills, 6, "email and password filled on every attempt");
    assert_eq!(state.pages_opened, 3);
    assert_eq!(state.pages_closed, 3);
    assert!(
        state
            .screenshots
            .contains(&"login_fail_no_error_attempt1.png".to_string()),
        "missing login-failure capture, got {:?}",
        state.screenshots
    );
}

#[tokio::test]
async fn panel_error_banner_is_reported_on_login_failure() {
    let panel = FakePanel::new(|s| {
        s.token_valid = false;
        s.password_valid = false;
        s.login_error_banner = Some("These credentials do not match our records.".into());
    });
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(full_credentials());
    cfg.screenshot_dir = dir.path().to_path_buf();

    let err = renew::run(&panel, None, &cfg).await.unwrap_err();
    match err {
        Error::RetriesExhausted { last, .. } => {
            assert!(last.contains("These credentials do not match our records."))
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }

    let state = panel.state.lock().unwrap();
    assert!(
        state
            .screenshots
            .contains(&"login_fail_error_message_attempt1.png".to_string()),
        "missing banner capture, got {:?}",
        state.screenshots
    );
}

#[tokio::test]
async fn navigation_failures_exhaust_retries_and_close_every_page() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.nav_fails = true;
    });
    let cfg = test_config(token_credentials());

    let err = renew::run(&panel, None, &cfg).await.unwrap_err();
    match err {
        Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other}"),
    }

    let state = panel.state.lock().unwrap();
    assert_eq!(state.pages_opened, 3);
    assert_eq!(state.pages_closed, 3, "every attempt's page must be closed");
}

#[tokio::test]
async fn present_button_that_fails_to_click_is_retried() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Enabled;
        s.click_fails = true;
    });
    let cfg = test_config(token_credentials());

    let err = renew::run(&panel, None, &cfg).await.unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { .. }));

    let state = panel.state.lock().unwrap();
    assert_eq!(state.pages_opened, 3);
    assert_eq!(state.pages_closed, 3);
    assert_eq!(state.clicks, 0);
}

#[tokio::test]
async fn rotation_failure_does_not_fail_the_run() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
    });
    let sink = CountingSink {
        fail: true,
        ..CountingSink::default()
    };
    let cfg = test_config(token_credentials());

    let outcome = renew::run(&panel, Some(&sink), &cfg).await.unwrap();
    assert_eq!(outcome, Renewal::Extended);
    assert_eq!(sink.updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disabled_button_run_is_idempotent() {
    let panel = FakePanel::new(|s| {
        s.token_valid = true;
        s.button = Button::Disabled;
    });
    let cfg = test_config(token_credentials());

    let first = renew::run(&panel, None, &cfg).await.unwrap();
    let second = renew::run(&panel, None, &cfg).await.unwrap();
    assert_eq!(first, Renewal::NotNeeded);
    assert_eq!(second, Renewal::NotNeeded);

    let state = panel.state.lock().unwrap();
    assert_eq!(state.clicks, 0);
    assert_eq!(state.pages_opened, 2);
    assert_eq!(state.pages_closed, 2);
}
