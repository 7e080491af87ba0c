use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use viral_ideas_queue::config::AppConfig;
use viral_ideas_queue::db;
use viral_ideas_queue::services::engine::AnalysisEngineClient;
use viral_ideas_queue::services::worker::AnalysisWorker;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting viral-ideas analysis worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize analysis engine client
    tracing::info!("Initializing analysis engine client");
    let engine = AnalysisEngineClient::new(config.engine_url.clone(), config.engine_api_token.clone());

    let worker = Arc::new(AnalysisWorker::new(
        db_pool,
        engine,
        config.worker_concurrency,
    ));

    // Rerun scheduler: periodically release terminal jobs whose next
    // scheduled run has come due. Shares the claim primitives with the
    // drain path, so racing them is safe.
    let scheduler = Arc::clone(&worker);
    let scan_interval = Duration::from_secs(config.rerun_scan_interval_secs);
    tokio::spawn(async move {
        loop {
            sleep(scan_interval).await;
            match scheduler.release_due_reruns().await {
                Ok(0) => tracing::trace!("No reruns due"),
                Ok(released) => tracing::info!(released, "Released scheduled reruns"),
                Err(e) => tracing::error!(error = %e, "Rerun scan failed"),
            }
        }
    });

    worker.run().await;
}
