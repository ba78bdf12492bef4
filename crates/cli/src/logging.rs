use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `-v` raises the default level to info, `-vv` to debug; `RUST_LOG` wins
/// when set. Output goes to stderr so screenshots and shell redirection of
/// stdout stay clean.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "gpanel_keeper=info,keeper_cli=info,keeper_cdp=warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
