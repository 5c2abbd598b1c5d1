use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_ingest::app_state::AppState;
use photo_ingest::config::AppConfig;
use photo_ingest::db::{self, queries::PgCatalog};
use photo_ingest::routes;
use photo_ingest::services::{
    jobs::{InMemoryJobStore, ManagerConfig, UploadJobManager},
    queue::{QueueConfig, RecognitionQueue},
    recognition::FaceApiClient,
    storage::R2Client,
};

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

    tracing::info!("Initializing photo-ingest server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("upload_jobs_total", "Total upload batches submitted");
    metrics::describe_counter!("upload_jobs_completed", "Upload batches that reached completed");
    metrics::describe_counter!("upload_jobs_failed", "Upload batches that failed fatally");
    metrics::describe_counter!("photos_processed_total", "Photos fully ingested");
    metrics::describe_counter!("photos_failed_total", "Photos whose ingestion failed");
    metrics::describe_counter!(
        "recognition_items_processed_total",
        "Recognition items processed successfully"
    );
    metrics::describe_counter!(
        "recognition_items_failed_total",
        "Recognition items that ended in error"
    );
    metrics::describe_gauge!(
        "recognition_queue_depth",
        "Items waiting in the recognition backlog"
    );
    metrics::describe_gauge!(
        "recognition_queue_active",
        "Items currently being processed"
    );
    metrics::describe_histogram!(
        "recognition_processing_seconds",
        "Time to process one recognition item"
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

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    // Start the bounded recognition queue and its worker pool
    tracing::info!(
        max_concurrent = config.max_concurrent,
        user_concurrency_limit = config.user_concurrency_limit,
        "Starting recognition queue"
    );
    let queue = RecognitionQueue::new(QueueConfig {
        max_concurrent: config.max_concurrent,
        user_concurrency_limit: config.user_concurrency_limit,
    });
    let recognizer = Arc::new(FaceApiClient::new(config.face_api_url.clone()));
    queue.start_workers(recognizer);

    // Wire up the upload job manager and its retention sweep
    let manager = UploadJobManager::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(r2_client),
        Arc::new(PgCatalog::new(db_pool.clone())),
        Arc::clone(&queue),
        ManagerConfig {
            chunk_size: config.upload_chunk_size,
            retention: Duration::from_secs(config.job_retention_secs),
            ..ManagerConfig::default()
        },
    );
    manager.spawn_retention_sweep(Duration::from_secs(60));

    // Create shared application state
    let state = AppState::new(db_pool, manager, queue);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/uploads", post(routes::uploads::submit_batch))
        .route("/api/v1/upload-jobs", get(routes::uploads::list_jobs))
        .route("/api/v1/upload-jobs/{job_id}", get(routes::uploads::get_job))
        .route("/api/v1/queue/status", get(routes::queue::queue_status))
        .route("/api/v1/queue/status/me", get(routes::queue::my_queue_status))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Both limits are needed: DefaultBodyLimit governs the multipart
        // extractor, RequestBodyLimitLayer the raw stream.
        .layer(axum::extract::DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(RequestBodyLimitLayer::new(100 * 1024 * 1024));

    tracing::info!("Starting photo-ingest on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
