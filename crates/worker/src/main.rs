//! Generation worker binary entry point

use std::sync::Arc;

use tracing::info;

use coursecraft_llm::LlmConfig;
use coursecraft_storage::{MetadataStore, PostgresConfig, PostgresStore};
use coursecraft_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursecraft_worker=info,coursecraft_storage=info".into()),
        )
        .init();

    info!("Course Crafter generation worker v{}", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::default();
    let store = Arc::new(PostgresStore::connect(&PostgresConfig::default()).await?);
    store.init_schema().await?;

    let llm = LlmConfig::default().client()?;
    let worker = Worker::new(store, llm, config.clone());

    info!(
        "Starting worker loop (poll interval {}s)",
        config.poll_interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Worker shutting down");
                break;
            }
            _ = worker.step() => {}
        }
    }

    Ok(())
}
