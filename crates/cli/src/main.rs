use clap::Parser;
use keeper_cli::cli::Cli;
use keeper_cli::config::RenewConfig;
use keeper_cli::panel::{CdpPanel, Panel};
use keeper_cli::secrets::{GithubSecrets, SecretSink};
use keeper_cli::{logging, renew};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let cfg = match RenewConfig::from_cli(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    // Fail before any browser or network activity when there is nothing to
    // log in with.
    if let Err(e) = cfg.credentials.validate() {
        error!(error = %e, "refusing to start");
        std::process::exit(1);
    }

    let secrets: Option<GithubSecrets> = match (&cli.github_token, &cli.github_repo) {
        (Some(token), Some(repo)) => match GithubSecrets::new(token.clone(), repo.clone()) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(error = %e, "secret rotation disabled");
                None
            }
        },
        _ => {
            info!("no GitHub token/repository configured, secret rotation disabled");
            None
        }
    };

    let panel = match &cli.cdp_endpoint {
        Some(endpoint) => CdpPanel::connect(endpoint).await,
        None => CdpPanel::launch(cli.cdp_port).await,
    };
    let panel = match panel {
        Ok(panel) => panel,
        Err(e) => {
            error!(error = %e, "could not start the browser");
            std::process::exit(1);
        }
    };

    let result = renew::run(
        &panel,
        secrets.as_ref().map(|s| s as &dyn SecretSink),
        &cfg,
    )
    .await;

    // One browser for the run, torn down exactly once.
    if let Err(e) = panel.close().await {
        warn!(error = %e, "browser shutdown reported an error");
    }

    match result {
        Ok(outcome) => {
            info!(?outcome, "done");
            std::process::exit(0);
        }
        Err(e) => {
            error!(error = %e, "renewal failed");
            std::process::exit(1);
        }
    }
}
