//! chainlens-api — serve the discovery and data query API.
//!
//! Configuration is read from `config/api.toml`, or the path given in
//! `CHAINLENS_API_CONFIG`.

use anyhow::Context;
use std::env;
use std::process::ExitCode;

use chainlens_api::ApiConfig;
use chainlens_core::logging::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config.log);

    match chainlens_api::serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "API server failed");
            ExitCode::from(2)
        }
    }
}

fn load_config() -> anyhow::Result<ApiConfig> {
    let path =
        env::var("CHAINLENS_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("could not read configuration at {path}"))?;
    toml::from_str(&raw).with_context(|| format!("invalid configuration in {path}"))
}
