use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::task::JoinError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cinder_chain::api;
use cinder_chain::config::NodeConfig;
use cinder_chain::crypto::{
    address_from_key, generate_private_key, load_private_key, save_private_key,
};
use cinder_chain::genesis::Genesis;
use cinder_chain::nameservice::NameService;
use cinder_chain::node::{Node, NodeArgs};
use cinder_chain::worker::Worker;

#[derive(Parser)]
#[command(author, version, about = "Account-based PoW/PoA blockchain node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node using configuration from NODE_* environment variables
    Start,
    /// Generate a new ECDSA private key file for an account
    Keygen {
        #[arg(short, long, default_value = "zblock/accounts/miner1.ecdsa")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => start_node().await?,
        Commands::Keygen { path } => keygen(path)?,
    }

    Ok(())
}

async fn start_node() -> Result<()> {
    let config = NodeConfig::from_env()?;
    let genesis = Genesis::load()?;

    let key = load_private_key(&config.key_path())?;
    let beneficiary_id = address_from_key(key.verifying_key());
    info!(beneficiary = %beneficiary_id, "loaded beneficiary key");

    let names = Arc::new(NameService::new(&config.name_service_folder)?);

    let public_addr = config.public_addr()?;
    let private_addr = config.private_addr()?;

    let node = Node::new(NodeArgs {
        config,
        genesis,
        beneficiary_id,
    })?;

    let worker = Worker::run(node.clone()).await;

    let public_task = tokio::spawn(api::serve_public(node.clone(), names, public_addr));
    let private_task = tokio::spawn(api::serve_private(node.clone(), private_addr));

    let result = tokio::select! {
        res = public_task => handle_join(res),
        res = private_task => handle_join(res),
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            worker.shutdown().await;
            Ok(())
        }
    };

    result?;
    Ok(())
}

fn keygen(path: PathBuf) -> Result<()> {
    let key = generate_private_key();
    save_private_key(&path, &key)?;
    info!(?path, account = %address_from_key(key.verifying_key()), "generated account key");
    Ok(())
}

fn handle_join(
    result: Result<cinder_chain::errors::ChainResult<()>, JoinError>,
) -> Result<()> {
    let inner = result?;
    inner?;
    Ok(())
}
