//! trustgate-maintenance - one maintenance pass, scheduled externally.
//!
//! Prunes expired shadow throttles, then reports whether the shared store
//! answers.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use trustgate::adapters::{build_store, PostgresThrottleRepository, SystemClock};
use trustgate::application::ShadowThrottleEngine;
use trustgate::config::AppConfig;
use trustgate::ports::Clock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    trustgate::telemetry::init_tracing(&config.logging).context("Failed to initialise tracing")?;

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    if config.database.run_migrations {
        PostgresThrottleRepository::migrate(&pool).await?;
        tracing::info!("migrations applied");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let throttles = ShadowThrottleEngine::new(
        Arc::new(PostgresThrottleRepository::new(pool)),
        clock.clone(),
        config.throttle.escalation.clone(),
    );
    let pruned = throttles.prune_expired().await?;

    let store_healthy = match build_store(&config.store, &config.redis, clock).await {
        Ok(store) => store.ping().await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "shared store unreachable");
            false
        }
    };

    tracing::info!(pruned, store_healthy, "maintenance pass complete");
    Ok(())
}
