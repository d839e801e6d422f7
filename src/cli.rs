use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vigil::runner::RunResult;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Run health checks and dispatch alert notifications",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/vigil/config.yaml, then /etc/vigil/config.yaml)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `vigil=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Directory holding file:// checks
    #[arg(long, global = true)]
    pub checks_dir: Option<String>,

    /// Cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,

    /// Log directory
    #[arg(long, global = true)]
    pub logs_dir: Option<String>,
}

impl Cli {
    /// Option-table overrides given on the command line
    pub fn option_overrides(&self) -> Vec<(&'static str, String)> {
        [
            ("checks-dir", &self.checks_dir),
            ("cache-dir", &self.cache_dir),
            ("logs-dir", &self.logs_dir),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one alert by name, or every alert
    Run {
        /// Alert to run
        alert: Option<String>,

        /// Validate notification targets without sending
        #[arg(long)]
        dry_run: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration
    Validate,

    /// Print the SHA-256 of a check executable for pinning
    Hash {
        file: PathBuf,
    },
}

/// Human-readable summary of one run
pub fn print_result(result: &RunResult) {
    let Some(failure) = &result.failure else {
        print_success(result);
        return;
    };

    println!("✗ Check: {}", result.check_uri);
    println!("  Error ({}): {}", failure.stage, failure.error);
    if !result.stderr.trim().is_empty() {
        println!("  Stderr: {}", result.stderr.trim_end());
    }
}

fn print_success(result: &RunResult) {
    println!("✓ Check: {}", result.check_uri);
    if !result.lines.is_empty() {
        println!("  Output:");
        for line in &result.lines {
            println!("    {}", line);
        }
    }

    let mut messages: Vec<&String> = result.rendered.values().collect();
    messages.sort();
    messages.dedup();
    match messages.as_slice() {
        [] => {}
        [message] => println!("  Rendered: {:?}", message),
        _ => {
            for (service, message) in &result.rendered {
                println!("  Rendered ({}): {:?}", service, message);
            }
        }
    }

    if !result.notified.is_empty() {
        let label = if result.dry_run { "Would notify" } else { "Notified" };
        println!("  {}: {}", label, result.notified.join(", "));
    }
}
