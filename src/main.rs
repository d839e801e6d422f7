//! vigil command-line driver
//!
//! Run with: vigil run [ALERT] [--dry-run]
//!
//! Environment variables:
//! - VIGIL_CONFIG: Config file path
//! - RUST_LOG: Log filter (default: vigil=info)

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{print_result, Cli, Commands};
use vigil::check::file_sha256;
use vigil::config::{self, Config};
use vigil::runner::Runner;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "vigil=info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::Run {
            alert,
            dry_run,
            json,
        } => {
            let config = load_config(&cli)?;
            let runner = Runner::new(Arc::new(config));
            let results = runner.run(alert.as_deref(), *dry_run).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                results.iter().for_each(print_result);
            }

            let failed = results.iter().filter(|r| !r.is_success()).count();
            if failed > 0 {
                tracing::debug!(failed, total = results.len(), "some alerts failed");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate => {
            let config = load_config(&cli)?;
            config.validate()?;
            println!(
                "✓ Config valid: {} alert(s), {} service(s)",
                config.alerts.len(),
                config.services.len()
            );
            for alert in &config.alerts {
                println!(
                    "  {} ({}, trigger: {})",
                    alert.name,
                    alert.check,
                    alert.trigger.kind()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hash { file } => {
            let digest = file_sha256(file).with_context(|| format!("hashing {}", file.display()))?;
            println!("{}", digest);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = config::resolve(cli.config.as_deref())?;
    for (name, value) in cli.option_overrides() {
        config::apply_option(&mut config, name, value)?;
    }
    Ok(config)
}
