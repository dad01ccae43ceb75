use std::error::Error;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paysync::adapters::http::{app_router, AppState, RouterOptions};
use paysync::adapters::providers::mock_registry;
use paysync::adapters::{
    PostgresLedgerStore, PostgresOrderReader, PostgresWebhookEventRepository, SystemClock,
    UuidIdGenerator,
};
use paysync::application::handlers::order::OrderExpiryWorker;
use paysync::application::handlers::webhook::{
    ReconcileDispatcher, RetrySweeper, WebhookProcessor, WebhookWorkerPool,
};
use paysync::application::{OrderLedger, PaymentConfirmer};
use paysync::config::AppConfig;
use paysync::ports::{Clock, IdGenerator, LedgerStore, OrderReader, ProviderRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = config.database.pool_options().connect(&config.database.url).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidIdGenerator);
    let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let reader: Arc<dyn OrderReader> = Arc::new(PostgresOrderReader::new(pool.clone()));
    let events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));

    let enabled = config.payment.providers()?;
    let providers = Arc::new(if config.payment.use_mock_providers {
        warn!(providers = ?enabled, "Using mock payment providers");
        mock_registry(&enabled)
    } else {
        // Provider clients are registered by the embedding deployment.
        warn!("No provider clients registered; payment calls will answer 503");
        ProviderRegistry::new()
    });

    let provider_timeout = config.payment.provider_timeout();
    let ledger = Arc::new(OrderLedger::new(
        store.clone(),
        clock.clone(),
        ids.clone(),
        config.payment.order_expiry(),
    ));
    let confirmer = Arc::new(PaymentConfirmer::new(
        ledger.clone(),
        clock.clone(),
        provider_timeout,
    ));

    let dispatcher = ReconcileDispatcher::new(
        ledger.clone(),
        confirmer.clone(),
        providers.clone(),
        clock.clone(),
    );
    let processor = Arc::new(WebhookProcessor::new(
        store.clone(),
        dispatcher,
        clock.clone(),
        ids.clone(),
        config.webhook.retry_policy(),
    ));
    let webhook_pool = Arc::new(WebhookWorkerPool::start(
        processor.clone(),
        config.webhook.worker_pool_config(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = RetrySweeper::new(
        events,
        processor.clone(),
        clock.clone(),
        config.webhook.retry_sweeper_config(),
    );
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_task = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let expiry = OrderExpiryWorker::new(
        ledger.clone(),
        reader.clone(),
        config.webhook.order_expiry_config(),
    );
    let expiry_task = tokio::spawn(async move { expiry.run(shutdown_rx).await });

    let state = AppState {
        ledger,
        reader,
        providers,
        confirmer,
        webhook_pool: webhook_pool.clone(),
        stats: processor.stats().clone(),
        provider_timeout,
    };
    let options = RouterOptions {
        request_timeout: config.server.request_timeout(),
        cors_origins: config.server.cors_origins_list(),
    };
    let app = app_router(state, &options);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, environment = ?config.server.environment, "paysync listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop the sweepers first, then drain whatever is still queued.
    let _ = shutdown_tx.send(true);
    for (name, task) in [("retry sweeper", sweeper_task), ("order expiry", expiry_task)] {
        if let Err(e) = task.await {
            error!(worker = name, error = %e, "Background worker ended abnormally");
        }
    }
    webhook_pool.shutdown().await;
    pool.close().await;
    info!("paysync stopped");

    served?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server");
}
