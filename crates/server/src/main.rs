use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pflow_core::{
    load_config, validate_config, Config, MemoryQueue, QueueBackend, QueueConsumer,
    QueueTransport, SqliteSubmissionStore, SqliteTicketStore, SubmissionCoordinator,
    SubmissionStore, SubmissionWorker, TicketStore, WorkerPool,
};
use pflow_server::api::create_router;
use pflow_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("pflow-tickets {}", VERSION);

    // Determine config path
    let config_path = std::env::var("PFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Queue backend: {}", config.queue.backend.as_str());

    // Create SQLite stores
    let submission_store: Arc<dyn SubmissionStore> = Arc::new(
        SqliteSubmissionStore::new(&config.database.path)
            .context("Failed to create submission store")?,
    );
    info!("Submission store initialized");

    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Ticket store initialized");

    // Create queue transport (and consumer when this process runs the worker)
    let (transport, consumer) = create_queue(&config)?;
    info!("Using queue transport: {}", transport.name());

    let coordinator = Arc::new(
        SubmissionCoordinator::new(Arc::clone(&submission_store), transport)
            .with_publish_timeout(config.queue.publish_timeout()),
    );

    // Create worker pool if enabled
    let worker_pool = match consumer {
        Some(consumer) => {
            let worker = Arc::new(SubmissionWorker::new(
                Arc::clone(&submission_store),
                Arc::clone(&ticket_store),
            ));
            let pool = Arc::new(WorkerPool::new(worker, consumer, config.worker.clone()));
            pool.start().await;
            info!(
                consumers = config.worker.consumers,
                max_delivery_attempts = config.worker.max_delivery_attempts,
                "Submission worker pool started"
            );
            Some(pool)
        }
        None => {
            info!("Submission worker disabled in config");
            None
        }
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        coordinator,
        ticket_store,
        worker_pool.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop worker pool if running
    if let Some(ref pool) = worker_pool {
        info!("Stopping submission worker pool...");
        pool.stop().await;
    }

    info!("Server shut down");
    Ok(())
}

type QueueHandles = (Arc<dyn QueueTransport>, Option<Arc<dyn QueueConsumer>>);

/// Build the configured queue backend.
fn create_queue(config: &Config) -> Result<QueueHandles> {
    match config.queue.backend {
        QueueBackend::Memory => {
            let queue = Arc::new(MemoryQueue::new(config.queue.buffer_size));
            let consumer: Arc<dyn QueueConsumer> = queue.clone();
            let transport: Arc<dyn QueueTransport> = queue;
            Ok((transport, Some(consumer)))
        }
        #[cfg(feature = "kafka")]
        QueueBackend::Kafka => {
            let kafka = config
                .queue
                .kafka
                .as_ref()
                .context("queue.kafka section is required")?;
            let timeout = config.queue.publish_timeout();

            if config.worker.enabled {
                let queue = Arc::new(
                    pflow_core::KafkaQueue::with_consumer(kafka, timeout)
                        .context("Failed to create Kafka consumer")?,
                );
                let consumer: Arc<dyn QueueConsumer> = queue.clone();
                let transport: Arc<dyn QueueTransport> = queue;
                Ok((transport, Some(consumer)))
            } else {
                let queue = pflow_core::KafkaQueue::producer(kafka, timeout)
                    .context("Failed to create Kafka producer")?;
                let transport: Arc<dyn QueueTransport> = Arc::new(queue);
                Ok((transport, None))
            }
        }
        #[cfg(not(feature = "kafka"))]
        QueueBackend::Kafka => anyhow::bail!("built without the kafka feature"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
