//! Run configuration, built once at process entry.
//!
//! The orchestrator never reads the environment; everything it needs is
//! captured here.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keeper_cdp::{Cookie, SameSite};
use url::Url;

use crate::cli::Cli;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub session_token: Option<String>,
    pub login: Option<Login>,
}

impl Credentials {
    /// At least one credential form must be present before any network
    /// activity happens.
    pub fn validate(&self) -> Result<()> {
        if self.session_token.is_none() && self.login.is_none() {
            return Err(Error::NoCredentials);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RenewConfig {
    pub server_url: String,
    pub login_url: String,
    pub max_retries: u32,
    pub credentials: Credentials,

    pub button_label: String,
    pub cookie_name: String,
    pub cookie_domain: String,
    pub secret_name: String,
    pub screenshot_dir: PathBuf,

    pub nav_timeout: Duration,
    pub selector_timeout: Duration,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
}

impl RenewConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let login = match (&cli.email, &cli.password) {
            (Some(email), Some(password)) => Some(Login {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            login_url: derive_login_url(&cli.server_url)?,
            server_url: cli.server_url.clone(),
            max_retries: cli.max_retries.max(1),
            credentials: Credentials {
                session_token: cli.session_cookie.clone(),
                login,
            },
            button_label: cli.button_label.clone(),
            cookie_name: cli.cookie_name.clone(),
            cookie_domain: cli.cookie_domain.clone(),
            secret_name: cli.secret_name.clone(),
            screenshot_dir: cli.screenshot_dir.clone(),
            nav_timeout: Duration::from_secs(60),
            selector_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(5),
        })
    }

    /// The stored remember-me token as a browser cookie, valid for a year.
    pub fn session_cookie(&self, token: &str) -> Cookie {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Cookie {
            name: self.cookie_name.clone(),
            value: token.to_string(),
            domain: self.cookie_domain.clone(),
            path: "/".to_string(),
            expires: Some(now + 3600.0 * 24.0 * 365.0),
            http_only: true,
            secure: true,
            same_site: Some(SameSite::Lax),
        }
    }

    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        self.screenshot_dir.join(name)
    }

    #[cfg(test)]
    pub fn for_tests(server_url: &str, credentials: Credentials) -> Self {
        Self {
            server_url: server_url.to_string(),
            login_url: derive_login_url(server_url).unwrap(),
            max_retries: 3,
            credentials,
            button_label: "ADD 6H".into(),
            cookie_name: "remember_web".into(),
            cookie_domain: ".example.com".into(),
            secret_name: "REMEMBER_WEB_COOKIE".into(),
            screenshot_dir: std::env::temp_dir(),
            nav_timeout: Duration::from_millis(50),
            selector_timeout: Duration::from_millis(50),
            retry_delay: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
        }
    }
}

/// The panel serves its login form at a fixed path under the same origin as
/// the server page.
fn derive_login_url(server_url: &str) -> Result<String> {
    let parsed = Url::parse(server_url)
        .map_err(|e| Error::Config(format!("invalid server URL {server_url}: {e}")))?;
    let origin = parsed.origin();
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "server URL must be http(s), got {server_url}"
        )));
    }
    Ok(format!("{}/auth/login", origin.ascii_serialization()))
}

/// True when a URL points at the panel's login or auth flow rather than a
/// server page.
pub fn is_login_url(url: &str) -> bool {
    url.contains("login") || url.contains("auth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_some_credential() {
        let err = Credentials::default().validate().unwrap_err();
        assert!(matches!(err, Error::NoCredentials));

        let creds = Credentials {
            session_token: Some("tok".into()),
            login: None,
        };
        assert!(creds.validate().is_ok());

        let creds = Credentials {
            session_token: None,
            login: Some(Login {
                email: "a@b.c".into(),
                password: "pw".into(),
            }),
        };
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn login_url_derived_from_server_origin() {
        assert_eq!(
            derive_login_url("https://gpanel.eternalzero.cloud/server/6b6f8709").unwrap(),
            "https://gpanel.eternalzero.cloud/auth/login"
        );
        assert_eq!(
            derive_login_url("https://panel.example:8443/server/x").unwrap(),
            "https://panel.example:8443/auth/login"
        );
    }

    #[test]
    fn login_url_rejects_garbage() {
        assert!(derive_login_url("not a url").is_err());
        assert!(derive_login_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn session_cookie_carries_panel_scoping() {
        let cfg = RenewConfig::for_tests(
            "https://panel.example/server/x",
            Credentials {
                session_token: Some("tok".into()),
                login: None,
            },
        );
        let cookie = cfg.session_cookie("tok");
        assert_eq!(cookie.name, "remember_web");
        assert_eq!(cookie.domain, ".example.com");
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
        assert!(cookie.expires.unwrap() > 0.0);
    }

    #[test]
    fn login_urls_recognized() {
        assert!(is_login_url("https://panel.example/auth/login"));
        assert!(is_login_url("https://panel.example/login?next=/server/x"));
        assert!(!is_login_url("https://panel.example/server/6b6f8709"));
    }
}
