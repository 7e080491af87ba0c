use axum::{routing::get, routing::patch, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use viral_ideas_queue::app_state::AppState;
use viral_ideas_queue::config::AppConfig;
use viral_ideas_queue::db;
use viral_ideas_queue::routes;
use viral_ideas_queue::services::engine::AnalysisEngineClient;
use viral_ideas_queue::services::queue::QueueManager;
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

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing viral-ideas-queue server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "viral_analysis_jobs_total",
        "Total analysis jobs submitted"
    );
    metrics::describe_counter!(
        "viral_analysis_jobs_completed",
        "Total analysis jobs completed"
    );
    metrics::describe_counter!(
        "viral_analysis_jobs_failed",
        "Total analysis jobs that failed"
    );
    metrics::describe_gauge!(
        "viral_analysis_queue_depth",
        "Current number of pending jobs in the queue"
    );
    metrics::describe_histogram!(
        "viral_analysis_processing_seconds",
        "Time to process an analysis job"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize analysis engine client
    tracing::info!("Initializing analysis engine client");
    let engine = AnalysisEngineClient::new(config.engine_url.clone(), config.engine_api_token.clone());

    // The server-side worker handle serves the drain path; the standalone
    // worker binary runs the continuous poll loop.
    let worker = AnalysisWorker::new(db_pool.clone(), engine, config.worker_concurrency);
    let queue = QueueManager::new(db_pool.clone());

    // Create shared application state
    let state = AppState::new(db_pool, queue, worker);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/viral-ideas/queue",
            post(routes::analysis::submit_analysis),
        )
        .route(
            "/api/viral-ideas/queue-status",
            get(routes::analysis::get_system_status),
        )
        .route(
            "/api/viral-ideas/queue/{session_id}",
            get(routes::analysis::get_analysis_status),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/start",
            post(routes::analysis::start_analysis),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/cancel",
            post(routes::analysis::cancel_analysis),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/pause",
            post(routes::analysis::pause_analysis),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/resume",
            post(routes::analysis::resume_analysis),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/schedule",
            patch(routes::analysis::update_schedule),
        )
        .route(
            "/api/viral-ideas/queue/{job_id}/competitors/{username}",
            patch(routes::analysis::update_competitor),
        )
        .route(
            "/api/viral-ideas/process-pending",
            post(routes::analysis::drain_pending),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting viral-ideas-queue on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
