use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use fundme_core::{
    config::HarnessConfig,
    suite::{self, CaseOutcome},
    verify::CheckRequest,
    HarnessError,
};

#[derive(Parser)]
#[command(
    name = "fundme",
    version,
    about = "Balance-conservation and access-control harness for FundMe"
)]
struct Cli {
    /// JSON file overriding the built-in network configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the network configuration as JSON.
    Networks,
    /// Run the suites selected for a network.
    Suite {
        #[arg(long, default_value = "hardhat")]
        network: String,
    },
    /// Check recorded balances and a transaction record for conservation.
    Check { file: PathBuf },
}

fn networks(config: &HarnessConfig) -> Result<ExitCode, HarnessError> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(ExitCode::SUCCESS)
}

fn run_suites(config: &HarnessConfig, network: &str) -> Result<ExitCode, HarnessError> {
    if !config.is_development(network) {
        log::info!(
            "{} is not a development network, rehearsing the staging suite locally",
            network
        );
    }
    let report = suite::run(network, config)?;
    for result in &report.results {
        println!("{}", result);
    }
    let passing = report.count(|outcome| *outcome == CaseOutcome::Passed);
    let pending = report.count(|outcome| *outcome == CaseOutcome::Skipped);
    let failing = report.failed().count();
    println!();
    println!("  {} passing, {} pending, {} failing", passing, pending, failing);
    Ok(if failing == 0 { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

fn check(path: &Path) -> Result<ExitCode, HarnessError> {
    let json = fs::read_to_string(path)?;
    let request: CheckRequest = serde_json::from_str(&json)?;
    let report = request.evaluate()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    for failure in report.failures() {
        log::warn!("{}", failure);
    }
    Ok(if report.passed() { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = HarnessConfig::load_or_default(cli.config.as_deref())
        .map_err(HarnessError::from)
        .and_then(|config| match &cli.command {
            Command::Networks => networks(&config),
            Command::Suite { network } => run_suites(&config, network),
            Command::Check { file } => check(file),
        });
    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::from(2)
        }
    }
}
