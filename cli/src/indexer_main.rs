//! chainlens-indexer — index one network into the relational store.
//!
//! Usage:
//! ```bash
//! chainlens-indexer <network>          # e.g. chainlens-indexer mainnet
//! ```
//!
//! Configuration is read from `<config-dir>/<network>.toml`; the directory
//! defaults to `config` and can be moved with `CHAINLENS_CONFIG_DIR`.
//! `LORRE_FAILURE_IGNORE=true|yes` keeps the loop alive through processing
//! failures.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use chainlens_core::config::{ignore_process_failures_from_env, NetworkConfig};
use chainlens_core::error::ConfigError;
use chainlens_core::logging::init_tracing;
use chainlens_indexer::IndexerLoop;
use chainlens_rpc::TezosNodeClient;
use chainlens_storage::PostgresStore;

#[tokio::main]
async fn main() -> ExitCode {
    let Some(network) = env::args().nth(1) else {
        eprintln!("configuration error: {}", ConfigError::MissingArgument("network"));
        print_usage();
        return ExitCode::from(1);
    };

    let config = match load_config(&network) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config.log);

    let ignore_process_failures = ignore_process_failures_from_env();
    info!(
        network = %config.name,
        platform = %config.platform,
        ignore_process_failures,
        "starting indexer"
    );

    let store = match PostgresStore::connect(&config.database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "could not open the store");
            return ExitCode::from(1);
        }
    };
    let node = match TezosNodeClient::new(&config.node, &config.batch) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!(error = %e, "could not build the node client");
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut lorre = IndexerLoop::new(node, store, config, ignore_process_failures, shutdown_rx);
    match lorre.run().await {
        Ok(()) => {
            info!("indexer finished cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "indexer terminated on failure");
            ExitCode::from(2)
        }
    }
}

fn print_usage() {
    eprintln!("Usage: chainlens-indexer <network>");
    eprintln!("  network   name of the configured network, e.g. mainnet");
}

fn load_config(network: &str) -> Result<NetworkConfig, ConfigError> {
    let dir = env::var("CHAINLENS_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let path = format!("{dir}/{network}.toml");
    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let config: NetworkConfig =
        toml::from_str(&raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    if config.name != network {
        return Err(ConfigError::UnknownNetwork(network.to_string()));
    }
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
