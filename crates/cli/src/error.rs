use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error: fatal, never retried.
    #[error(
        "no login credentials: set REMEMBER_WEB_COOKIE, or LOGIN_EMAIL and LOGIN_PASSWORD"
    )]
    NoCredentials,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { ms: u64, what: String },

    #[error("page interaction failed: {0}")]
    Interaction(String),

    #[error("all {attempts} attempts failed, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("secret rotation failed: {0}")]
    Rotation(String),

    #[error("browser driver: {0}")]
    Browser(#[from] keeper_cdp::CdpError),
}
