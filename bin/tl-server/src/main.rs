//! Tigerlink Server
//!
//! Runs the PMS event ingress API and the check-in delivery pipeline in one process:
//! PMS → `/events/checkin` → RabbitMQ → check-in handler → Tiger SOAP → PMS callback.
//!
//! ## Configuration
//!
//! Settings come from a TOML file (`TIGERLINK_CONFIG`, `config.toml`, `tigerlink.toml`,
//! `./config/config.toml` or `/etc/tigerlink/config.toml`) with `TIGERLINK_*`
//! environment overrides on top. A `.env` file is loaded first when present.
//!
//! ## Degraded start
//!
//! If the broker is unreachable at startup the HTTP API still comes up. Ingress
//! answers 503 until publishing works, and the queue worker keeps retrying the
//! consumer in the background.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tl_config::ConfigLoader;
use tl_queue::{
    AmqpConnectionManager, AmqpConsumer, AmqpConsumerConfig, QueueConsumer, ReliablePublisher,
    Topology,
};
use tl_router::{
    api::{create_router, AppState},
    create_event_log_sink, CheckInHandler, EventHandlerRegistry, HttpPmsCallbackClient,
    HttpTigerClient, MemoryIdempotencyStore, MessageOrchestrator, QueueWorker,
};
use tokio::{net::TcpListener, signal, sync::broadcast};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    tl_common::logging::init_logging("tl-server");

    info!("Starting Tigerlink server");

    // 1. Configuration
    let config = ConfigLoader::new().load()?;
    config.validate()?;

    info!(
        nodes = ?config.rabbitmq.nodes,
        events_queue = %config.rabbitmq.queues.events,
        tiger_enabled = config.tiger.enabled,
        pms_callback_enabled = config.pms_callback.enabled,
        elastic_enabled = config.elastic.enabled,
        "Configuration loaded"
    );

    // 2. Metrics recorder
    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder - /metrics disabled");
            None
        }
    };

    // 3. Broker topology (best effort)
    let publisher_connection = Arc::new(AmqpConnectionManager::from_config(&config.rabbitmq));
    if let Err(e) = Topology::new(&config.rabbitmq).ensure(&publisher_connection).await {
        error!(error = %e, "Broker unavailable or topology declaration failed - running degraded");
    }

    // 4. Publisher, clients and the check-in handler
    let publisher = Arc::new(ReliablePublisher::new(
        publisher_connection.clone(),
        &config.rabbitmq,
    ));
    let event_log = create_event_log_sink(&config.elastic)?;
    let tiger = Arc::new(HttpTigerClient::new(config.tiger.clone())?);
    let pms = Arc::new(HttpPmsCallbackClient::new(config.pms_callback.clone())?);
    let store = Arc::new(MemoryIdempotencyStore::new());

    let handler = Arc::new(CheckInHandler::new(
        tiger,
        pms,
        store,
        publisher.clone(),
        event_log.clone(),
        config.idempotency.ttl(),
    ));
    let registry = Arc::new(EventHandlerRegistry::new().with_handler(handler));
    info!(event_types = ?registry.event_types(), "Event handlers registered");

    let orchestrator = Arc::new(MessageOrchestrator::new(registry));

    // 5. Consumer on its own connection
    let consumer_connection = Arc::new(AmqpConnectionManager::from_config(&config.rabbitmq));
    let consumer: Arc<dyn QueueConsumer> = Arc::new(AmqpConsumer::new(
        AmqpConsumerConfig::from_rabbit(&config.rabbitmq),
        consumer_connection,
    ));
    let worker = QueueWorker::new(consumer, orchestrator);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker_shutdown = shutdown_tx.subscribe();
    let worker_handle = tokio::spawn(async move {
        worker.run(worker_shutdown).await;
    });

    // 6. HTTP API
    let mut state = AppState::new(publisher.clone(), event_log)
        .with_ws_user_key(config.tiger.ws_user_key.clone());
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP API listening");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Tigerlink started. Press Ctrl+C to shutdown.");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    // in-flight deliveries still republish, so the publisher outlives the worker drain
    match tokio::time::timeout(Duration::from_secs(30), worker_handle).await {
        Ok(_) => info!("Queue worker stopped"),
        Err(_) => warn!("Queue worker did not stop within 30s"),
    }
    if tokio::time::timeout(Duration::from_secs(10), server_handle).await.is_err() {
        warn!("HTTP server did not stop within 10s");
    }

    publisher.shutdown();
    publisher_connection.close().await;

    info!("Tigerlink shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
