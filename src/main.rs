use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use staybook_backend::config::Config;
use staybook_backend::database::postgres::PgTransactionStore;
use staybook_backend::database::reservations::{PgReservationDirectory, ReservationDirectory};
use staybook_backend::database::transaction::TransactionStore;
use staybook_backend::database::{self, PoolConfig};
use staybook_backend::payments::engine::PaymentEngine;
use staybook_backend::payments::providers::ChapaGateway;
use staybook_backend::payments::reconciler;
use staybook_backend::state::AppState;
use staybook_backend::api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting Staybook payment backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Gateway: {}", config.chapa.base_url);

    let pool = database::init_pool(
        &config.database.url,
        PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        },
    )
    .await?;

    let store: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool.clone()));
    let reservations: Arc<dyn ReservationDirectory> =
        Arc::new(PgReservationDirectory::new(pool));
    let gateway = Arc::new(ChapaGateway::new(config.chapa.clone()));
    let engine = Arc::new(PaymentEngine::new(
        store.clone(),
        gateway,
        config.chapa.currency.clone(),
    ));

    if config.reconciler.enabled {
        reconciler::spawn(engine.clone(), store.clone(), config.reconciler.clone());
        tracing::info!(
            interval_secs = config.reconciler.interval_secs,
            "reconciliation sweep enabled"
        );
    }

    let state = AppState {
        engine,
        store,
        reservations,
        auth: config.auth.clone(),
        environment: config.server.environment.clone(),
        enforce_webhook_signature: config.chapa.webhook_secret.is_some(),
    };

    let app = api::router(state);

    let host: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid HOST: {}", config.server.host))?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
