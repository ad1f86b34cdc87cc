use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use shopdesk_infra::config::WorkerConfig;
use shopdesk_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore, ensure_schema};
use shopdesk_infra::notifications::{
    InMemoryPlatformNotifications, InMemoryTenantNotifications, PlatformNotificationSink,
    PostgresPlatformNotifications, PostgresTenantNotifications, TenantNotificationSink,
};
use shopdesk_infra::processor::{EventProcessor, ProcessorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopdesk_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            ensure_schema(&pool).await.context("failed to apply migrations")?;
            tracing::info!(max_connections = config.database_max_connections, "connected to postgres");

            run(
                PostgresEventStore::new(pool.clone()),
                PostgresPlatformNotifications::new(pool.clone()),
                PostgresTenantNotifications::new(pool),
                config.processor,
            )
            .await
        }
        None => {
            run(
                InMemoryEventStore::new(),
                InMemoryPlatformNotifications::new(),
                InMemoryTenantNotifications::new(),
                config.processor,
            )
            .await
        }
    }
}

async fn run<S, P, T>(store: S, platform: P, tenant: T, config: ProcessorConfig) -> anyhow::Result<()>
where
    S: EventStore + 'static,
    P: PlatformNotificationSink + 'static,
    T: TenantNotificationSink + 'static,
{
    let processor = Arc::new(EventProcessor::new(store, platform, tenant).with_config(config));
    let handle = processor.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    handle.shutdown().await;
    Ok(())
}
