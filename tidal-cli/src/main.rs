//! Tidal CLI - Command-line interface
//!
//! Runs fluid congestion-control simulations and prints their traces as JSON.

mod commands;

use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tidal_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "tidal")]
#[command(about = "Fluid TCP congestion control simulator")]
struct Cli {
    /// Console log level; RUST_LOG takes precedence
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::default())]
    log_level: CliLogLevel,

    /// Directory for a full-detail log of the run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Indent JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    commands::handle_command(cli.command, cli.pretty).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tidal_core::Algorithm;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_single_defaults() {
        let cli = Cli::try_parse_from(["tidal", "single"]).unwrap();
        assert!(!cli.pretty);
        match cli.command {
            commands::Commands::Single { algorithm, link } => {
                assert_eq!(algorithm, Algorithm::Reno);
                assert_eq!(link.bandwidth, 7.0);
                assert_eq!(link.buffer, 50);
            }
            _ => panic!("expected single command"),
        }
    }

    #[test]
    fn test_ns3_flow_list() {
        let cli = Cli::try_parse_from([
            "tidal",
            "--pretty",
            "ns3",
            "--flows",
            "reno,Cubic,BBR",
            "--qdisc",
            "fq_codel",
        ])
        .unwrap();
        assert!(cli.pretty);
        match cli.command {
            commands::Commands::Ns3 { flows, qdisc, .. } => {
                assert_eq!(flows, vec![Algorithm::Reno, Algorithm::Cubic, Algorithm::Bbr]);
                assert_eq!(qdisc.as_deref(), Some("fq_codel"));
            }
            _ => panic!("expected ns3 command"),
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        assert!(Cli::try_parse_from(["tidal", "single", "--algorithm", "vegas"]).is_err());
    }
}
