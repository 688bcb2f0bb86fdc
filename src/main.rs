//! Furnish Commerce - furniture storefront order & payment ledger

use anyhow::{Context, Result};
use furnish_commerce::config::AppConfig;
use furnish_commerce::events::EventPublisher;
use furnish_commerce::gateway::{HttpGateway, MockGateway, PaymentGateway};
use furnish_commerce::http::{router, AppState, WebhookSecret, SERVICE_NAME};
use furnish_commerce::repositories::{CartStore, ItemStore, MemoryStore, OrderStore, PgStore};
use furnish_commerce::services::{LedgerSettings, OrderLedger, Storefront};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let (orders, items, carts): (Arc<dyn OrderStore>, Arc<dyn ItemStore>, Arc<dyn CartStore>) = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url, config.database_max_connections).await.context("database unavailable")?);
            (store.clone(), store.clone(), store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store.clone(), store)
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => { warn!(error = %e, "NATS unavailable, events will not be published"); None }
        },
        None => None,
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        Some(gw) => Arc::new(HttpGateway::new(&gw.base_url, &gw.secret_key, gw.timeout).context("payment gateway client")?),
        None => {
            warn!("payment gateway not configured, using the mock gateway");
            Arc::new(MockGateway::new())
        }
    };
    if config.webhook_secret.is_none() {
        warn!("PAYMENT_WEBHOOK_SECRET not set, accepting unsigned webhooks for the mock gateway");
    }

    let settings = LedgerSettings {
        currency: config.currency.clone(),
        success_url: config.success_url(),
        cancel_url: config.cancel_url(),
        ..LedgerSettings::default()
    };
    let state = AppState {
        ledger: OrderLedger::new(orders, items.clone(), carts.clone(), gateway, EventPublisher::new(nats), settings),
        storefront: Storefront::new(items, carts),
        webhook_secret: config.webhook_secret.clone().map(|secret| WebhookSecret { secret, tolerance_secs: config.webhook_tolerance_secs }),
    };

    let app = router(state);
    info!("🚀 {} listening on 0.0.0.0:{}", SERVICE_NAME, config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
