//! Run one pattern scenario file and write the JSON run report.
//!
//! # Usage
//!
//! ```bash
//! patseq-run --scenario pattern.toml --pretty
//! RUST_LOG=patseq_sequencer=debug patseq-run --scenario pattern.toml --output run.json --profile
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use patseq_runner::{run_scenario, RunOptions, Scenario};
use tracing_subscriber::EnvFilter;

/// Run a pattern scenario through the deterministic sequencer
#[derive(Parser)]
#[command(name = "patseq-run")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scenario TOML file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,

    /// Include the execution profile in the output
    #[arg(long)]
    profile: bool,

    /// Profile width in columns
    #[arg(long)]
    columns: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = Scenario::from_file(&cli.scenario)
        .with_context(|| format!("load scenario {}", cli.scenario.display()))?;

    let options = RunOptions {
        profile: cli.profile,
        profile_columns: cli.columns,
    };
    let output = run_scenario(&scenario, &options)
        .with_context(|| format!("run scenario {}", scenario.name))?;
    let json = output.to_json(cli.pretty)?;

    match cli.output {
        Some(path) => std::fs::write(&path, format!("{json}\n"))
            .with_context(|| format!("write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
