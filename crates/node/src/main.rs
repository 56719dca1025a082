//! Node entry point.
//!
//! Usage: `tessera-node <config.json> <genesis.json>`
//!
//! Opens (or recovers) the store, starts the purge loop, and waits for
//! ctrl-c. Network ingress is wired by the embedding process via
//! `Coordinator::receive_message`.

use std::sync::Arc;
use tessera_consensus::{NullEngine, TrustingOracle};
use tessera_node::{Coordinator, NodeConfig};
use tessera_types::{deserialize, GenesisData};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tessera_node::init_tracing();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: tessera-node <config.json> <genesis.dat>"))?;
    let genesis_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: tessera-node <config.json> <genesis.dat>"))?;

    let config = NodeConfig::load(std::path::Path::new(&config_path))?;
    let genesis_bytes = std::fs::read(&genesis_path)?;
    let genesis: GenesisData = deserialize(&genesis_bytes)?;

    let coordinator = Coordinator::open(
        config,
        genesis,
        Arc::new(NullEngine),
        Box::new(TrustingOracle::default()),
    )?;

    let purge = tokio::spawn(coordinator.clone().run_purge_loop());

    let (lfb, height) = coordinator.last_finalized();
    info!(%lfb, %height, era = %coordinator.genesis_index(), "Node running");

    tokio::signal::ctrl_c().await?;
    coordinator.shutdown();
    let _ = purge.await;
    Ok(())
}
