use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use payment_service::api::{payments as payment_routes, ApiState};
use payment_service::config::AppConfig;
use payment_service::database::notification_repository::NotificationRepository;
use payment_service::database::payment_repository::PaymentRepository;
use payment_service::database::store::PaymentStore;
use payment_service::database::init_pool_from_config;
use payment_service::health::HealthChecker;
use payment_service::logging::init_tracing;
use payment_service::middleware::logging::{request_logging_middleware, UuidRequestId};
use payment_service::payments::daraja::{DarajaClient, MpesaGateway};
use payment_service::services::order_notifier::HttpOrderNotifier;
use payment_service::services::push_initiator::PushInitiator;
use payment_service::services::reconciler::Reconciler;
use payment_service::services::refund::RefundService;
use payment_service::services::status_verifier::StatusVerifier;
use payment_service::workers::notify_retry::NotifyRetryWorker;
use payment_service::workers::status_sweep::{StatusSweepConfig, StatusSweepWorker};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.mpesa.environment,
        "🚀 Starting payment service"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        anyhow::anyhow!(e)
    })?;
    info!("✅ Database connection pool initialized");

    info!("📱 Initializing Daraja client...");
    let gateway: Arc<dyn MpesaGateway> = Arc::new(DarajaClient::new(config.mpesa.clone())?);
    info!(
        base_url = %config.mpesa.base_url,
        short_code = %config.mpesa.short_code,
        "✅ Daraja client initialized"
    );

    let store: Arc<dyn PaymentStore> = Arc::new(PaymentRepository::new(db_pool.clone()));
    let notifications = Arc::new(NotificationRepository::new(db_pool.clone()));
    let order_notifier = Arc::new(HttpOrderNotifier::new(
        config.orders.clone(),
        notifications.clone(),
    )?);

    let initiator = Arc::new(PushInitiator::new(
        store.clone(),
        gateway.clone(),
        config.mpesa.country_code.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(store.clone(), order_notifier.clone()));
    let verifier = Arc::new(StatusVerifier::new(
        store.clone(),
        gateway.clone(),
        reconciler.clone(),
    ));
    let refunds = Arc::new(RefundService::new(store.clone()));
    let health_checker = HealthChecker::new(db_pool.clone());

    // Background workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);

    let sweep_enabled = std::env::var("STATUS_SWEEP_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    if sweep_enabled {
        let sweep_config = StatusSweepConfig::from_env();
        let worker = StatusSweepWorker::new(store.clone(), verifier.clone(), sweep_config);
        tokio::spawn(worker.run(worker_shutdown_rx));
        info!("✅ Status sweep worker started");
    } else {
        info!("Status sweep worker disabled (STATUS_SWEEP_ENABLED=false)");
    }

    let retry_enabled = std::env::var("NOTIFY_RETRY_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    if retry_enabled {
        let retry_worker = NotifyRetryWorker::new(
            notifications.clone(),
            order_notifier.clone(),
            60, // Check every 60 seconds
            10,
        );
        tokio::spawn(async move {
            retry_worker.run().await;
        });
        info!("✅ Order notification retry worker started");
    } else {
        info!("Order notification retry worker disabled (NOTIFY_RETRY_ENABLED=false)");
    }

    info!("🛣️  Setting up application routes...");
    let state = ApiState {
        store,
        initiator,
        reconciler,
        verifier,
        refunds,
        health_checker,
    };

    let app = payment_routes::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(%addr, "🌐 Payment service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx))
        .await?;

    info!("👋 Payment service stopped");
    Ok(())
}
