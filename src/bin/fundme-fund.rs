use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use fundme_core::{
    config::HarnessConfig,
    devnet::Devnet,
    target::FundMeTarget,
    units::{format_ether, parse_ether},
    HarnessError,
};

/// Deploys FundMe for a network and funds it from the deployer account.
#[derive(Parser)]
#[command(name = "fundme-fund", version)]
struct Args {
    /// Network name. Defaults to the network listed for the devnet's chain id.
    #[arg(long)]
    network: Option<String>,
    /// Amount in ether.
    #[arg(long, default_value = "0.03")]
    value: String,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn fund(args: &Args) -> Result<(), HarnessError> {
    let config = HarnessConfig::load_or_default(args.config.as_deref())?;
    let value = parse_ether(&args.value)?;

    let mut devnet = Devnet::new(config.devnet.clone())?;
    let network = match &args.network {
        Some(name) => config.resolve(name)?,
        None => devnet.network_settings(&config),
    };
    let deployment = devnet.deploy(&network, &config.mock)?;
    let deployer = devnet.deployer()?;

    log::info!("Funding Contract...");
    let receipt = devnet.fund(&deployer, value)?;
    log::debug!(
        "{} ether sent to {} in block {} ({} gas)",
        format_ether(value),
        deployment.fund_me,
        receipt.block_number,
        receipt.gas_used
    );
    log::info!("Funded!");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match fund(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
