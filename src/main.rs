use customer_loader::{
    batch::Orchestrator,
    config::Config,
    pool::WorkerPool,
    store::RecordStore,
    strategy::DispatchContext,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The main entry point for the loader.
///
/// Loads the configuration, builds a runtime with one thread per pool
/// worker, and runs every configured strategy against the store.
fn main() -> anyhow::Result<()> {
    // Initialize logging using tracing_subscriber.
    tracing_subscriber::fmt::init();

    let config = Config::load("config/default.toml")?;
    info!("Customer loader starting with config: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.pool.workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(RecordStore::connect(&config.database).await?);

    // The pool lives for the whole process and is shared by every strategy
    let pool = Arc::new(WorkerPool::new(config.pool.workers));

    let join_timeout = config.pool.join_timeout_ms.map(Duration::from_millis);
    let orchestrator = Orchestrator::new(
        DispatchContext {
            store: store.clone(),
            pool: pool.clone(),
        },
        config.load.clone(),
        join_timeout,
    );

    let results = orchestrator.run_all(&config.load.strategies).await;
    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    info!(runs = results.len(), failed, "All strategies finished");

    if !pool.shutdown_if_idle().await {
        warn!("Worker pool still busy at exit");
    }
    store.close().await;

    Ok(())
}
