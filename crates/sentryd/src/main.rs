use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use sentry_core::init_tracing;
use sentry_state::StateStore;
use sentryd::{ApiConfig, DEFAULT_PORT};

/// Agent Sentry trust query service
#[derive(Parser)]
#[command(name = "sentryd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding state.json, agents.json and ipfs-registry.json
    #[arg(long, env = "SENTRY_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Full-report price in the asset's smallest unit
    #[arg(long, env = "SENTRY_PRICE", default_value = "10000")]
    price: String,

    /// Payment recipient (defaults to the attester wallet)
    #[arg(long, env = "SENTRY_PAY_TO")]
    pay_to: Option<Address>,

    #[arg(long, env = "SENTRY_OPERATOR_ENS")]
    operator_ens: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let mut config = ApiConfig {
        listen_addr: SocketAddr::new(cli.host, cli.port),
        data_dir: cli.data_dir,
        price: cli.price,
        operator_ens: cli.operator_ens,
        ..ApiConfig::default()
    };
    if let Some(pay_to) = cli.pay_to {
        config.pay_to = pay_to;
    }

    let store = StateStore::open(&config.data_dir)
        .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;

    tracing::info!(
        data_dir = %config.data_dir.display(),
        pay_to = %config.pay_to,
        price = %config.price,
        "starting sentryd"
    );
    sentryd::serve(config, store)
        .await
        .context("trust query service failed")
}
