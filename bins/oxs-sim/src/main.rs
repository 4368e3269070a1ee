//! OXS protocol simulator.
//!
//! Builds the protocol on an in-memory token ledger and a manual clock, runs
//! a deterministic multi-week scenario and prints a JSON report.

mod scenario;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use oxs_protocol::ProtocolConfig;

use crate::scenario::{Scenario, ScenarioSettings};

#[derive(Parser, Debug)]
#[command(name = "oxs-sim", version, about = "Deterministic OXS staking, tier and farming simulator")]
struct Args {
    /// TOML configuration file. Defaults to <config dir>/oxs/oxs.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of weekly emissions to release and claim.
    #[arg(long, default_value_t = 12)]
    weeks: u32,

    /// Unix timestamp the simulated clock starts at.
    #[arg(long, default_value_t = 1_700_000_000)]
    start: u64,

    /// Reward tokens funded into farming custody, in whole OXS.
    #[arg(long, default_value_t = 1_000_000)]
    farming_budget_oxs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);
    if let Err(e) = run(args) {
        error!("simulation failed: {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = ProtocolConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if args.print_config {
        println!("{}", config.to_toml().context("failed to render configuration")?);
        return Ok(());
    }

    info!(weeks = args.weeks, start = args.start, "starting simulation");
    let settings = ScenarioSettings {
        weeks: args.weeks,
        start: args.start,
        farming_budget_oxs: args.farming_budget_oxs,
    };
    let mut scenario = Scenario::new(&config, settings).context("failed to assemble protocol")?;
    let report = scenario.run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("simulation complete");
    Ok(())
}

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. Logs go to stderr so the
/// JSON report on stdout stays parseable.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
