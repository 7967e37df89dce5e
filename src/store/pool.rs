use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

use super::StoreError;

/// Name reported to PostgreSQL in `pg_stat_activity`
const APPLICATION_NAME: &str = "lms-notification-service";

/// Open the connection pool backing `PostgresNotificationStore`.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let options: PgConnectOptions = config.url.parse()?;
    let options = options.application_name(APPLICATION_NAME);

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
        .idle_timeout(Duration::from_secs(u64::from(config.idle_timeout_seconds)))
        .connect_with(options)
        .await?;

    tracing::info!(
        pool_size = config.pool_size,
        "Connected to PostgreSQL notification store"
    );

    Ok(pool)
}
