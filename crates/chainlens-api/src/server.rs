//! Server assembly and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use chainlens_metadata::{
    indexed_schema, AttributeQueryEngine, MetadataService, PgDataSource, QueryPolicy,
};
use chainlens_storage::{BlockStore as _, PostgresStore};

use crate::config::ApiConfig;
use crate::routes::{router, ApiState};

/// Connect to the store, assemble the metadata stack, and serve until a
/// shutdown signal arrives.
pub async fn serve(config: ApiConfig) -> anyhow::Result<()> {
    let store = PostgresStore::connect(&config.database_url).await?;
    let source = Arc::new(PgDataSource::new(&store));

    let service = Arc::new(MetadataService::new(
        vec![indexed_schema(&config.platform, &config.networks)],
        config.metadata_overrides.clone(),
        source.clone(),
    ));
    let refresher =
        service.spawn_cache_refresher(Duration::from_secs(config.cache_refresh_secs));

    let engine = Arc::new(AttributeQueryEngine::new(
        service.clone(),
        source,
        QueryPolicy::from(&config.query),
    ));

    let state = ApiState {
        metadata: service,
        engine,
        api_keys: Arc::new(config.api_keys.clone()),
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.abort();
    store.close().await;
    info!("API server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
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
