use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wagerline_simulator::{Api, Simulator, SimulatorConfig, Snapshot, StatePersistence};

#[derive(Parser, Debug)]
#[command(author, version, about = "Local backend for wagerline")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// YAML file with execution rules, genesis balances and block timing.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite file holding the state snapshot and receipts.
    #[arg(long)]
    persistence_path: Option<PathBuf>,

    /// Overrides `block_interval_ms` from the config file.
    #[arg(long)]
    block_interval_ms: Option<u64>,
}

fn build_config(args: &Args) -> Result<SimulatorConfig> {
    let mut config = match &args.config {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::default(),
    };
    if let Some(interval) = args.block_interval_ms {
        config.block_interval_ms = interval;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = build_config(&args)?;
    let allocations = config.genesis_allocations()?;
    let interval = Duration::from_millis(config.block_interval_ms);

    let (persistence, snapshot) = match &args.persistence_path {
        Some(path) => {
            let (persistence, snapshot) = StatePersistence::load_and_start_sqlite(path, 1024)
                .context("load and start state persistence")?;
            info!(path = %path.display(), entries = snapshot.state.len(), "state persistence enabled");
            (Some(persistence), snapshot)
        }
        None => (None, Snapshot::default()),
    };
    let fresh = snapshot.state.is_empty();

    let simulator = Arc::new(Simulator::from_snapshot(config, snapshot, persistence));
    if fresh {
        let total = simulator
            .allocate_genesis(&allocations)
            .await
            .context("allocate genesis")?;
        info!(total, accounts = allocations.len(), "genesis applied");
    } else {
        info!(height = simulator.height().await?, "resumed from snapshot");
    }

    tokio::spawn(simulator.clone().run(interval));

    let api = Api::new(simulator);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, api.router().into_make_service())
        .await
        .context("serve api")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_block_interval() {
        let args = Args::parse_from(["simulator", "--block-interval-ms", "50"]);
        let config = build_config(&args).expect("config should build");
        assert_eq!(config.block_interval_ms, 50);
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn rejects_zero_block_interval() {
        let args = Args::parse_from(["simulator", "--block-interval-ms", "0"]);
        let err = build_config(&args).unwrap_err();
        assert!(
            err.to_string().contains("block_interval_ms"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn reads_yaml_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulator.yaml");
        std::fs::write(&path, "block_interval_ms: 200\nmempool_capacity: 5\n").unwrap();
        let args = Args::parse_from([
            "simulator".to_string(),
            "--config".to_string(),
            path.display().to_string(),
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.block_interval_ms, 200);
        assert_eq!(config.mempool_capacity, 5);
    }
}
