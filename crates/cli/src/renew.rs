//! The renewal orchestrator.
//!
//! One pass per attempt: session-cookie auth, password fallback, target-page
//! confirmation, then the button. Transient failures sleep a fixed delay and
//! retry up to the configured bound; the attempt's page is closed on every
//! exit path. Session-cookie rotation is best effort and never changes the
//! outcome.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Login, RenewConfig, is_login_url};
use crate::error::{Error, Result};
use crate::panel::{Panel, PanelPage};
use crate::secrets::SecretSink;

const EMAIL_SELECTOR: &str = r#"input[name="email"]"#;
const PASSWORD_SELECTOR: &str = r#"input[name="password"]"#;
const SUBMIT_SELECTOR: &str = r#"button[type="submit"]"#;
const ERROR_BANNER_SELECTOR: &str = ".alert.alert-danger, .error-message, .form-error";

/// Final outcome of a successful run. Every variant maps to exit code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// The extension button was clicked.
    Extended,
    /// The button was present but disabled; the server does not need more
    /// time yet.
    NotNeeded,
    /// The button never appeared on the target page.
    ButtonUnavailable,
}

/// Runs the whole renewal flow against an open browser.
///
/// Validates credentials before touching the browser, then makes up to
/// `max_retries` sequential attempts. The caller owns the browser lifecycle;
/// this function owns the per-attempt pages.
pub async fn run(
    panel: &dyn Panel,
    secrets: Option<&dyn SecretSink>,
    cfg: &RenewConfig,
) -> Result<Renewal> {
    cfg.credentials.validate()?;

    let mut last_error = String::from("no attempt ran");
    for attempt in 1..=cfg.max_retries {
        info!(attempt, max = cfg.max_retries, "starting renewal attempt");

        let page = match panel.new_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(attempt, error = %e, "could not open a page");
                last_error = e.to_string();
                pause_before_retry(attempt, cfg).await;
                continue;
            }
        };

        let outcome = run_attempt(page.as_ref(), secrets, cfg, attempt).await;

        if let Err(outcome_err) = &outcome {
            // Auth failures capture their own evidence; anything else gets
            // the generic attempt-tagged shot.
            if !matches!(outcome_err, Error::Auth(_)) {
                capture(
                    page.as_ref(),
                    cfg,
                    &format!("general_error_attempt{attempt}.png"),
                )
                .await;
            }
        }
        if let Err(e) = page.close().await {
            warn!(attempt, error = %e, "failed to close page");
        }

        match outcome {
            Ok(renewal) => {
                info!(attempt, ?renewal, "renewal run succeeded");
                return Ok(renewal);
            }
            Err(e) => {
                warn!(attempt, error = %e, "attempt failed");
                last_error = e.to_string();
                pause_before_retry(attempt, cfg).await;
            }
        }
    }

    Err(Error::RetriesExhausted {
        attempts: cfg.max_retries,
        last: last_error,
    })
}

async fn pause_before_retry(attempt: u32, cfg: &RenewConfig) {
    if attempt < cfg.max_retries {
        debug!(delay_ms = cfg.retry_delay.as_millis() as u64, "pausing before retry");
        tokio::time::sleep(cfg.retry_delay).await;
    }
}

async fn run_attempt(
    page: &dyn PanelPage,
    secrets: Option<&dyn SecretSink>,
    cfg: &RenewConfig,
    attempt: u32,
) -> Result<Renewal> {
    authenticate(page, cfg, attempt).await?;

    if let Some(sink) = secrets {
        rotate_session_cookie(page, sink, cfg).await;
    }

    confirm_on_server_page(page, cfg, attempt).await?;
    perform_renewal(page, cfg).await
}

/// Establishes a session: stored cookie first, email/password fallback.
async fn authenticate(page: &dyn PanelPage, cfg: &RenewConfig, attempt: u32) -> Result<()> {
    let mut authenticated = false;

    if let Some(token) = &cfg.credentials.session_token {
        debug!("trying stored session cookie");
        page.add_session_cookie(&cfg.session_cookie(token)).await?;
        page.goto(&cfg.server_url, cfg.nav_timeout).await?;

        let url = page.current_url().await?;
        if is_login_url(&url) {
            info!("stored session cookie was rejected, falling back to password login");
            page.clear_cookies().await?;
        } else {
            if url != cfg.server_url {
                debug!(%url, "landed off-target, re-navigating");
                page.goto(&cfg.server_url, cfg.nav_timeout).await?;
            }
            info!("authenticated with stored session cookie");
            authenticated = true;
        }
    }

    if !authenticated {
        let Some(login) = &cfg.credentials.login else {
            return Err(Error::Auth(
                "session cookie rejected and no email/password configured".into(),
            ));
        };
        password_login(page, login, cfg, attempt).await?;
    }

    Ok(())
}

async fn password_login(
    page: &dyn PanelPage,
    login: &Login,
    cfg: &RenewConfig,
    attempt: u32,
) -> Result<()> {
    info!(url = %cfg.login_url, "logging in with email and password");
    page.goto(&cfg.login_url, cfg.nav_timeout).await?;

    page.wait_for_selector(EMAIL_SELECTOR, cfg.selector_timeout)
        .await?;
    page.wait_for_selector(PASSWORD_SELECTOR, cfg.selector_timeout)
        .await?;
    page.wait_for_selector(SUBMIT_SELECTOR, cfg.selector_timeout)
        .await?;

    page.fill(EMAIL_SELECTOR, &login.email).await?;
    page.fill(PASSWORD_SELECTOR, &login.password).await?;
    page.click(SUBMIT_SELECTOR).await?;

    if wait_for_url(page, &cfg.server_url, cfg.nav_timeout).await? {
        info!("password login succeeded");
        return Ok(());
    }

    // Login did not land on the server page; look for the panel's own error
    // banner before giving up on this attempt.
    match page.element_text(ERROR_BANNER_SELECTOR).await {
        Ok(Some(text)) if !text.is_empty() => {
            capture(
                page,
                cfg,
                &format!("login_fail_error_message_attempt{attempt}.png"),
            )
            .await;
            Err(Error::Auth(format!("panel rejected login: {text}")))
        }
        _ => {
            capture(page, cfg, &format!("login_fail_no_error_attempt{attempt}.png")).await;
            Err(Error::Auth(
                "login did not reach the server page and no error banner was shown".into(),
            ))
        }
    }
}

/// Polls the page URL until it equals `expected`. Returns false once
/// `timeout` elapses; errors reading the URL propagate to the caller.
async fn wait_for_url(page: &dyn PanelPage, expected: &str, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.current_url().await? == expected {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Makes sure we are actually on the server page before touching the button.
async fn confirm_on_server_page(
    page: &dyn PanelPage,
    cfg: &RenewConfig,
    attempt: u32,
) -> Result<()> {
    let url = page.current_url().await?;
    if url == cfg.server_url {
        return Ok(());
    }

    debug!(%url, "not on the server page, navigating");
    page.goto(&cfg.server_url, cfg.nav_timeout).await?;

    let url = page.current_url().await?;
    if url != cfg.server_url && is_login_url(&url) {
        capture(
            page,
            cfg,
            &format!("server_page_nav_fail_attempt{attempt}.png"),
        )
        .await;
        return Err(Error::Auth("session expired while confirming the server page".into()));
    }
    Ok(())
}

/// Locates the extension button and acts on it.
///
/// A button that never appears is success (nothing to renew), and a disabled
/// button is success. A button that is present but fails to probe or click
/// is a transient failure and retries; the original script counted that as
/// success too, which hid real page breakage.
async fn perform_renewal(page: &dyn PanelPage, cfg: &RenewConfig) -> Result<Renewal> {
    info!(label = %cfg.button_label, "looking for the extension button");

    match page
        .find_labeled_button(&cfg.button_label, cfg.selector_timeout)
        .await?
    {
        Some(state) if state.disabled => {
            info!("extension button is disabled, no renewal needed");
            capture(page, cfg, "button_disabled.png").await;
            Ok(Renewal::NotNeeded)
        }
        Some(_) => {
            info!("extension button is enabled, clicking");
            page.click_labeled_button(&cfg.button_label).await?;
            tokio::time::sleep(cfg.settle_delay).await;
            capture(page, cfg, "button_clicked.png").await;
            Ok(Renewal::Extended)
        }
        None => {
            warn!(label = %cfg.button_label, "extension button not found on the server page");
            capture(page, cfg, "button_not_found.png").await;
            Ok(Renewal::ButtonUnavailable)
        }
    }
}

/// Reads the (possibly rotated) session cookie back out of the browser and
/// pushes it to the secret store. Failures are logged, never propagated.
async fn rotate_session_cookie(page: &dyn PanelPage, sink: &dyn SecretSink, cfg: &RenewConfig) {
    let value = match page.read_cookie(&cfg.cookie_name, &cfg.server_url).await {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(cookie = %cfg.cookie_name, "no session cookie in the jar, skipping rotation");
            return;
        }
        Err(e) => {
            warn!(error = %e, "could not read the session cookie back");
            return;
        }
    };

    match sink.update(&cfg.secret_name, &value).await {
        Ok(()) => info!(secret = %cfg.secret_name, "session cookie rotated into the secret store"),
        Err(e) => warn!(secret = %cfg.secret_name, error = %e, "secret rotation failed"),
    }
}

/// Best-effort diagnostic screenshot.
async fn capture(page: &dyn PanelPage, cfg: &RenewConfig, name: &str) {
    let path = cfg.screenshot_path(name);
    if let Err(e) = page.screenshot(&path).await {
        warn!(path = %path.display(), error = %e, "screenshot failed");
    }
}
