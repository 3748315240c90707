//! ctlsync CLI
//!
//! Hosts the controller synchronization engine as a long-lived process.
//!
//! # Commands
//!
//! - `run` - Sync with the controller and print change events as JSON lines
//! - `list` - List the configured services the controller reports right now
//! - `config` - Show the effective configuration
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Keep a local view of controller services in sync.
#[derive(Parser)]
#[command(name = "ctlsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Controller URL, overriding the configuration file
    #[arg(global = true, short, long)]
    url: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync with the controller and print change events as JSON lines
    Run {
        /// Service type to track (repeatable)
        #[arg(short = 't', long = "service-type", required = true)]
        service_types: Vec<String>,

        /// Seconds between health log lines
        #[arg(long, default_value = "60")]
        health_interval: u64,
    },

    /// List the configured services the controller reports right now
    List {
        /// Service type to include (repeatable)
        #[arg(short = 't', long = "service-type", required = true)]
        service_types: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the effective configuration after defaults
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            service_types,
            health_interval,
        } => {
            let config = commands::load_config(cli.config.as_deref(), cli.url)?;
            let health_interval = Duration::from_secs(health_interval.max(1));
            commands::run::run(config, service_types, health_interval).await?;
        }
        Commands::List {
            service_types,
            format,
        } => {
            let config = commands::load_config(cli.config.as_deref(), cli.url)?;
            commands::list::run(&config, &service_types, &format).await?;
        }
        Commands::Config => {
            let config = commands::load_config(cli.config.as_deref(), cli.url)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("ctlsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_a_service_type() {
        assert!(Cli::try_parse_from(["ctlsync", "run"]).is_err());

        let cli = Cli::try_parse_from([
            "ctlsync", "run", "-t", "argocd", "--service-type", "jenkins", "-c", "conf.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("conf.yaml")));
        match cli.command {
            Commands::Run {
                service_types,
                health_interval,
            } => {
                assert_eq!(service_types, vec!["argocd", "jenkins"]);
                assert_eq!(health_interval, 60);
            }
            _ => panic!("expected run"),
        }
    }
}
