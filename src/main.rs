use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tigerdb::analysis::AnalyzerRegistry;
use tigerdb::http::{server, AppState};
use tigerdb::{Config, IndexManager};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Precedence: CLI flag > environment > default
    let mut config = Config::from_env();
    config.apply_args(std::env::args().skip(1));

    if !config.http_enabled {
        tracing::error!("http surface disabled via TIGERDB_ES_ENABLED, nothing to serve");
        std::process::exit(1);
    }

    let manager = match IndexManager::new(config.clone(), AnalyzerRegistry::new()) {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize index manager");
            std::process::exit(1);
        }
    };
    tracing::info!(
        data_dir = %config.data_dir.display(),
        indices = manager.list_indices().len(),
        "tigerdb starting"
    );

    let state = AppState::new(manager, config);
    if let Err(err) = server::serve(state).await {
        tracing::error!(error = %err, "server terminated with error");
        std::process::exit(1);
    }
    tracing::info!("tigerdb stopped");
}
