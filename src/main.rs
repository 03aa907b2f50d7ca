//! Library Payments service entry point.
//!
//! Builds the gateway client and payment handlers from configuration,
//! serves the gateway callback route and runs the expiry sweeper until
//! ctrl-c is received.

use std::sync::Arc;

use sqlx::postgres::PgPool;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use library_payments::adapters::gateway::HttpPaymentGateway;
use library_payments::adapters::http::webhook::{webhook_router, WebhookAppState};
use library_payments::adapters::notification::TracingPaymentNotifier;
use library_payments::adapters::postgres::{PostgresPaymentRepository, PostgresSavedCardRepository};
use library_payments::application::handlers::payment::PaymentTransitioner;
use library_payments::application::{ExpirySweeper, PaymentPorts, PaymentServices};
use library_payments::config::AppConfig;
use library_payments::domain::payment::CallbackSignatureVerifier;
use library_payments::ports::{
    PaymentGateway, PaymentNotifier, PaymentRepository, SavedCardRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let pool: PgPool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(HttpPaymentGateway::new(config.gateway.http_config())?);
    let repository: Arc<dyn PaymentRepository> =
        Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let saved_cards: Arc<dyn SavedCardRepository> =
        Arc::new(PostgresSavedCardRepository::new(pool));
    let notifier: Arc<dyn PaymentNotifier> = Arc::new(TracingPaymentNotifier::new());
    let transitioner = Arc::new(
        PaymentTransitioner::new(repository.clone(), notifier)
            .with_max_attempts(config.payment.transition_attempts),
    );

    let services = PaymentServices::new(
        PaymentPorts {
            gateway,
            repository: repository.clone(),
            saved_cards,
            transitioner: transitioner.clone(),
        },
        CallbackSignatureVerifier::new(config.gateway.webhook_secret.clone()),
        config.payment.settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::with_config(
        repository,
        transitioner,
        config.payment.sweeper_config(),
    )
    .with_reconciler(services.verify_status.clone());
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let app = webhook_router()
        .with_state(WebhookAppState {
            callback_handler: services.callbacks.clone(),
        })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.server.request_timeout()))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "library payments listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }
    tracing::info!("library payments stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.server.json_logs() {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
