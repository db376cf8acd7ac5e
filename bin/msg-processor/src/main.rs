//! Messaging Delivery Processor
//!
//! Runs every channel processor against the SQLite message store, re-publishes
//! PENDING work left by a previous run, and serves health and metrics.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MSG_CONFIG` | `config.toml` | Configuration file (missing file means defaults) |
//! | `MSG_DATABASE_URL` | `sqlite://messaging.db?mode=rwc` | Message store URL |
//! | `MSG_SERVER_PORT` | `9090` | Metrics/health port |
//! | `MSG_DISPATCHER_CONCURRENCY` | `16` | Concurrent processor invocations |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use msg_config::{AppConfig, ConfigSource, HttpEndpointConfig};
use msg_pipeline::{
    ChannelProcessor, DeliveryHandler, EventDispatcher, GenericMessageProcessor, LetterProcessor,
    RecoveryScanner, RetryPolicy,
};
use msg_sender::{
    DigitalMail, Email, HttpChannelSender, HttpFeedbackChannelResolver, HttpSenderConfig, Sms,
    SnailMail, WebMessage,
};
use msg_store::{DeliveryRepository, SqliteDeliveryRepository};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

struct AppState {
    prometheus: PrometheusHandle,
    ready: AtomicBool,
}

fn sender_config(endpoint: &HttpEndpointConfig) -> HttpSenderConfig {
    HttpSenderConfig {
        base_url: endpoint.base_url.clone(),
        path: endpoint.path.clone(),
        api_token: endpoint.api_token.clone(),
        connect_timeout: Duration::from_millis(endpoint.connect_timeout_ms),
        request_timeout: Duration::from_millis(endpoint.request_timeout_ms),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = AppConfig::load()?;
    msg_common::logging::init(config.logging.format);

    info!("Starting Messaging Delivery Processor");
    match &source {
        ConfigSource::File(_) => info!("Loaded configuration from {}", source),
        ConfigSource::Defaults(_) => warn!("Using configuration {}", source),
    }

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    let state = Arc::new(AppState {
        prometheus,
        ready: AtomicBool::new(false),
    });

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Message store
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    let sqlite = SqliteDeliveryRepository::new(pool);
    sqlite.init_schema().await?;
    let repository: Arc<dyn DeliveryRepository> = Arc::new(sqlite);
    info!("Message store initialized: {}", config.database.url);

    // Processors
    let dispatcher = EventDispatcher::new(config.dispatcher.concurrency);
    let senders = &config.senders;
    let retry = &config.retry;

    let digital_sender = Arc::new(HttpChannelSender::<DigitalMail>::new(sender_config(&senders.digital_mail))?);
    let snail_sender = Arc::new(HttpChannelSender::<SnailMail>::new(sender_config(&senders.snail_mail))?);
    let resolver = Arc::new(HttpFeedbackChannelResolver::new(sender_config(&config.feedback))?);

    let handlers: Vec<Arc<dyn DeliveryHandler>> = vec![
        Arc::new(ChannelProcessor::<Sms>::new(
            repository.clone(),
            Arc::new(HttpChannelSender::<Sms>::new(sender_config(&senders.sms))?),
            retry.for_channel("sms").into(),
        )),
        Arc::new(ChannelProcessor::<Email>::new(
            repository.clone(),
            Arc::new(HttpChannelSender::<Email>::new(sender_config(&senders.email))?),
            retry.for_channel("email").into(),
        )),
        Arc::new(ChannelProcessor::<WebMessage>::new(
            repository.clone(),
            Arc::new(HttpChannelSender::<WebMessage>::new(sender_config(&senders.web_message))?),
            retry.for_channel("web_message").into(),
        )),
        Arc::new(ChannelProcessor::<DigitalMail>::new(
            repository.clone(),
            digital_sender.clone(),
            retry.for_channel("digital_mail").into(),
        )),
        Arc::new(ChannelProcessor::<SnailMail>::new(
            repository.clone(),
            snail_sender.clone(),
            retry.for_channel("snail_mail").into(),
        )),
        Arc::new(
            LetterProcessor::new(
                repository.clone(),
                digital_sender,
                snail_sender,
                retry.first_override(&["letter", "digital_mail"]).into(),
            )
            .with_snail_policy(RetryPolicy::from(retry.for_channel("snail_mail"))),
        ),
        Arc::new(GenericMessageProcessor::new(
            repository.clone(),
            resolver,
            dispatcher.publisher(),
            retry.for_channel("message").into(),
        )),
    ];

    let mut loops = Vec::with_capacity(handlers.len());
    for handler in handlers {
        loops.push(dispatcher.subscribe(handler)?);
    }
    info!("{} processors subscribed", loops.len());

    // Resume work left by a previous run
    let recovered = RecoveryScanner::new(repository.clone(), dispatcher.publisher())
        .run()
        .await?;
    info!("Recovery scan published {} events", recovered);
    state.ready.store(true, Ordering::SeqCst);

    // Start metrics server
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Metrics server listening on http://{}/metrics", metrics_addr);

    let metrics_app = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/health", axum::routing::get(health_handler))
        .route("/ready", axum::routing::get(ready_handler))
        .with_state(state.clone());

    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    let metrics_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("Messaging Delivery Processor started");
    info!("Press Ctrl+C to shutdown");

    // Wait for shutdown
    shutdown_signal().await;
    info!("Shutdown signal received, draining in-flight deliveries...");
    state.ready.store(false, Ordering::SeqCst);

    if tokio::time::timeout(DRAIN_TIMEOUT, dispatcher.wait_idle()).await.is_err() {
        warn!(
            in_flight = dispatcher.publisher().in_flight(),
            "Drain timed out, unfinished messages stay pending for recovery"
        );
    }

    dispatcher.shutdown();
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        for handle in loops {
            let _ = handle.await;
        }
        let _ = metrics_handle.await;
    })
    .await;

    info!("Messaging Delivery Processor shutdown complete");
    Ok(())
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.prometheus.render()
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> (StatusCode, axum::Json<serde_json::Value>) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, axum::Json(serde_json::json!({ "status": "READY" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({ "status": "NOT_READY" })),
        )
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
