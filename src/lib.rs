pub mod config;
pub mod resolver;
pub mod server;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use config::{AppConfig, LoggingConfig};
use resolver::{MediaPipeline, TempAssetStore};
use server::AppState;

/// Install the global tracing subscriber. `RUST_LOG` wins over config.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

/// Build the process (config, logging, temp store, pipeline) and serve
/// until shutdown.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    let store = Arc::new(TempAssetStore::open(config.temp_dir())?);
    tracing::info!(root = %store.root().display(), "temp asset store ready");

    let pipeline = MediaPipeline::from_config(&config, store)?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    server::serve(&config.server, state).await
}
