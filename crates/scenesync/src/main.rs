//! scenesync CLI - operator front end for the scene graph engine
//!
//! Binary name: `scenesync`

use std::{
    io::{self, BufReader},
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use clap::ArgMatches;
use scenesync_core::{load_config, Config, Engine};
use tracing_subscriber::EnvFilter;

mod cli;
mod replay;

/// `--log` wins over `RUST_LOG`, which wins over the configured filter.
fn init_tracing(config: &Config, log_override: Option<&str>) -> Result<()> {
    let filter = match log_override {
        Some(filter) => EnvFilter::try_new(filter).context("Invalid --log filter")?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.log.filter)
                .with_context(|| format!("Invalid log filter '{}'", config.log.filter))?,
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

async fn run_replay(config: &Config, matches: &ArgMatches) -> Result<()> {
    let engine = Engine::with_config(config);

    if let Some(seed) = matches.get_one::<String>("seed") {
        replay::seed(&engine, Path::new(seed)).await?;
    }

    let file = matches
        .get_one::<String>("file")
        .context("FILE argument is required")?;
    let stdout = io::stdout().lock();

    let handled = if file == "-" {
        replay::run(&engine, io::stdin().lock(), stdout).await?
    } else {
        let input = std::fs::File::open(file)
            .map_err(scenesync_core::Error::from)
            .with_context(|| format!("Failed to open request file {file}"))?;
        replay::run(&engine, BufReader::new(input), stdout).await?
    };

    tracing::info!(handled, revision = engine.revision().await, "Replay finished");
    Ok(())
}

fn run_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    #[allow(clippy::print_stdout)]
    {
        print!("{rendered}");
    }
    Ok(())
}

async fn run_cli() -> Result<()> {
    let matches = cli::build_cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    init_tracing(&config, matches.get_one::<String>("log").map(String::as_str))?;

    match matches.subcommand() {
        Some(("replay", sub)) => run_replay(&config, sub).await,
        Some(("config", _)) => run_config(&config),
        _ => Err(anyhow::anyhow!("Unknown command")),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {err:#}");
        }

        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<scenesync_core::Error>())
            .map_or(1, scenesync_core::Error::exit_code);

        #[allow(clippy::exit)]
        process::exit(code);
    }
}
