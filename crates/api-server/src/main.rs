//! API Server Binary Entry Point

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursecraft_api_server::{start_server, ApiState, SessionConfig};
use coursecraft_storage::{MetadataStore, PostgresConfig, PostgresStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coursecraft_api_server=info,coursecraft_storage=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get bind address from environment or use default
    let addr = std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    // Connect storage and make sure the schema exists
    let store = Arc::new(PostgresStore::connect(&PostgresConfig::default()).await?);
    store.init_schema().await?;

    let state = ApiState::new(store, SessionConfig::default());

    tracing::info!("Starting Course Crafter API server");
    start_server(&addr, state).await?;

    Ok(())
}
