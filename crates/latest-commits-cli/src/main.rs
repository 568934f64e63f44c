mod config;
mod logging;
mod summary;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use latest_commits::{EXIT_FAILURE, Orchestrator, resolve};
use latest_commits_http::HttpTransport;
use tracing::warn;

use crate::config::{Settings, Tuning};

#[derive(Parser)]
#[command(name = "fetch-latest-commits", version)]
#[command(about = "Download latest_commits.txt for builds and platforms from Artifactory")]
#[command(
    after_help = "Set ARTIFACTORY_TOKEN for bearer auth, or pass --user and --password for basic auth."
)]
struct Cli {
    /// Repository root, e.g. https://artifactory.example.com/native/repo/cp_dev
    #[arg(long)]
    base_url: String,
    /// Build ids to fetch, e.g. 3025 3026
    #[arg(long, required = true, num_args = 1..)]
    builds: Vec<String>,
    /// Platforms to fetch, e.g. windows linux arm
    #[arg(long, required = true, num_args = 1..)]
    platforms: Vec<String>,
    /// Username for basic auth (ignored when ARTIFACTORY_TOKEN is set)
    #[arg(long, requires = "password")]
    user: Option<String>,
    /// Password for basic auth
    #[arg(long, requires = "user")]
    password: Option<String>,
    /// Config file with defaults [default: ~/.config/latest-commits/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log every request attempt
    #[arg(short, long)]
    verbose: bool,
    #[command(flatten)]
    tuning: Tuning,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let file = config::load_config(cli.config.as_deref())?;
    let settings = Settings::merge(&cli.tuning, &file)?;

    let resolved = config::resolve_auth(config::token_from_env(), cli.user, cli.password);
    if let Some(warning) = &resolved.warning {
        warn!("{warning}");
    }

    let builds = config::split_identifiers(&cli.builds);
    let platforms = config::split_identifiers(&cli.platforms);
    let targets = resolve(&builds, &platforms, &cli.base_url, &settings.out)
        .context("invalid fetch targets")?;

    let transport = HttpTransport::new(settings.timeout).context("failed to set up HTTP client")?;
    let orchestrator = Orchestrator::new(
        transport,
        resolved.auth,
        settings.retry_policy(),
        settings.run_options(),
    );

    match orchestrator.run(targets, &settings.out).await {
        Ok(summary) => {
            summary::print(&summary);
            Ok(ExitCode::from(summary.result.exit_code()))
        }
        Err(e) => {
            summary::print(e.summary());
            eprintln!("error: {e}");
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}
