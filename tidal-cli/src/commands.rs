//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use serde::Serialize;
use tidal_core::{Algorithm, LinkParams, TidalConfig};
use tidal_sim::{Ns3Bridge, Ns3Request, Scenario, SingleFlowParams, run_single_flow};
use tracing::{info, warn};

/// Bottleneck and run length shared by single-link commands
#[derive(Args, Debug, Clone, Copy)]
pub struct LinkArgs {
    /// Bottleneck bandwidth in Mbps
    #[arg(long, default_value_t = 7.0)]
    pub bandwidth: f64,
    /// One-way propagation delay in ms
    #[arg(long, default_value_t = 10.0)]
    pub delay: f64,
    /// Bottleneck buffer in packets
    #[arg(long, default_value_t = 50)]
    pub buffer: u32,
    /// Simulated time in seconds
    #[arg(long, default_value_t = 10.0)]
    pub duration: f64,
    /// Segment size in bytes
    #[arg(long, default_value_t = 1500)]
    pub mss: u32,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate one flow over one bottleneck link
    Single {
        /// Congestion control algorithm (Reno, Cubic, BBR)
        #[arg(short, long, default_value = "Reno")]
        algorithm: Algorithm,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Simulate a multi-flow scenario described in a JSON file
    Multi {
        /// Scenario file
        scenario: PathBuf,
    },
    /// Run the same dumbbell through ns-3
    Ns3 {
        /// Comma-separated algorithm per flow
        #[arg(long, value_delimiter = ',', default_value = "Reno")]
        flows: Vec<Algorithm>,
        #[command(flatten)]
        link: LinkArgs,
        /// Trace sampling interval in seconds
        #[arg(long)]
        sample_dt: Option<f64>,
        /// Queue discipline at the bottleneck
        #[arg(long)]
        qdisc: Option<String>,
        /// ns-3 checkout (defaults to TIDAL_NS3_DIR or ./ns3)
        #[arg(long)]
        ns3_dir: Option<PathBuf>,
        /// Seconds before the ns-3 run is killed
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands, pretty: bool) -> anyhow::Result<()> {
    let config = TidalConfig::from_env();
    config.validate()?;

    match command {
        Commands::Single { algorithm, link } => run_single(algorithm, link, &config, pretty),
        Commands::Multi { scenario } => run_scenario(scenario, &config, pretty).await,
        Commands::Ns3 {
            flows,
            link,
            sample_dt,
            qdisc,
            ns3_dir,
            timeout_secs,
        } => {
            let request = Ns3Request {
                flows,
                link: LinkParams::new(link.bandwidth, link.delay, link.buffer, link.mss),
                duration: link.duration,
                sample_dt,
                qdisc,
            };
            let mut config = config;
            if let Some(dir) = ns3_dir {
                config.external.ns3_dir = dir;
            }
            if let Some(seconds) = timeout_secs {
                config.external.timeout = Duration::from_secs(seconds);
            }
            run_ns3(request, &config, pretty).await
        }
    }
}

fn run_single(
    algorithm: Algorithm,
    link: LinkArgs,
    config: &TidalConfig,
    pretty: bool,
) -> anyhow::Result<()> {
    let params = SingleFlowParams {
        algorithm,
        bandwidth: link.bandwidth,
        delay: link.delay,
        buffer: link.buffer,
        duration: link.duration,
        mss: link.mss,
    };
    let report = run_single_flow(params, config)?;
    info!(
        "Mean throughput {:.3} Mbps over {} samples",
        report.mean_throughput(),
        report.trace.len()
    );
    print_json(&report, pretty)
}

async fn run_scenario(path: PathBuf, config: &TidalConfig, pretty: bool) -> anyhow::Result<()> {
    let body = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario = Scenario::from_json(&body)
        .with_context(|| format!("Invalid scenario {}", path.display()))?;

    let report = scenario.run(config)?;
    if !report.violations.is_empty() {
        warn!(
            "{} invariant violations recorded, see report",
            report.violations.len()
        );
    }
    print_json(&report, pretty)
}

async fn run_ns3(request: Ns3Request, config: &TidalConfig, pretty: bool) -> anyhow::Result<()> {
    let bridge = Ns3Bridge::new(&config.external);
    let report = bridge.run(&request).await?;
    print_json(&report, pretty)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
