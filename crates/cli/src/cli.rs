use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gpanel-keeper")]
#[command(about = "Keeps a gpanel-hosted server alive by clicking its time-extension button")]
#[command(version)]
pub struct Cli {
    /// Server management page to renew
    #[arg(default_value = "https://gpanel.eternalzero.cloud/server/6b6f8709")]
    pub server_url: String,

    /// Attempts before giving up
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Stored panel session cookie value
    #[arg(long, env = "REMEMBER_WEB_COOKIE", hide_env_values = true)]
    pub session_cookie: Option<String>,

    /// Panel account email (fallback when the session cookie is missing or stale)
    #[arg(long, env = "LOGIN_EMAIL")]
    pub email: Option<String>,

    /// Panel account password
    #[arg(long, env = "LOGIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// GitHub token used to rotate the stored session cookie
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Repository (owner/name) holding the secret to rotate
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub github_repo: Option<String>,

    /// Name of the Actions secret that stores the session cookie
    #[arg(long, default_value = "REMEMBER_WEB_COOKIE")]
    pub secret_name: String,

    /// Visible text of the renewal button
    #[arg(long, default_value = "ADD 6H")]
    pub button_label: String,

    /// Name of the panel's remember-me cookie
    #[arg(
        long,
        default_value = "remember_web_59ba36addc2b2f9401580f014c7f58ea4e30989d"
    )]
    pub cookie_name: String,

    /// Domain the session cookie is scoped to
    #[arg(long, default_value = ".eternalzero.cloud")]
    pub cookie_domain: String,

    /// Directory for diagnostic screenshots
    #[arg(long, default_value = ".")]
    pub screenshot_dir: PathBuf,

    /// Attach to a running browser's debug endpoint instead of launching one
    #[arg(long, value_name = "URL")]
    pub cdp_endpoint: Option<String>,

    /// Remote debugging port for the launched browser
    #[arg(long, default_value = "9222")]
    pub cdp_port: u16,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
