//! Storefront Orders - multi-tenant storefront order service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::config::AppConfig;
use storefront_orders::http::{router, AppState};
use storefront_orders::publisher::EventPublisher;
use storefront_orders::services::OrderService;
use storefront_orders::storage::{MemoryStorage, PgStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "storefront_orders=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = AppConfig::from_env()?;

    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(url) => {
            let pg = PgStorage::connect(url, config.max_connections, config.storage_timeout).await?;
            pg.migrate().await?;
            tracing::info!("using PostgreSQL storage");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory only");
            Arc::new(MemoryStorage::new())
        }
    };

    let publisher = match &config.nats_url {
        Some(url) => match EventPublisher::connect(url, config.nats_subject_prefix.clone()).await {
            Ok(publisher) => publisher,
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events disabled");
                EventPublisher::disabled()
            }
        },
        None => EventPublisher::disabled(),
    };

    let orders = OrderService::new(storage.clone(), publisher, config.pricing, config.storage_timeout);
    let app = router(AppState { storage, orders, timeout: config.storage_timeout });

    let addr = config.socket_addr();
    tracing::info!("storefront-orders listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
