//! Notification record storage.
//!
//! - `MemoryNotificationStore`: in-memory storage using DashMap (default)
//! - `PostgresNotificationStore`: persistent storage in a `notifications` table
//!
//! Use `create_notification_store()` to pick the backend from configuration.

mod backend;
mod memory_backend;
mod postgres_backend;
pub mod pool;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StoreConfig;

pub use backend::{NotificationStore, StoreError};
pub use memory_backend::MemoryNotificationStore;
pub use pool::connect_pool;
pub use postgres_backend::PostgresNotificationStore;

/// Create a notification store based on configuration.
///
/// - `"postgres"`: a `PostgresNotificationStore` if a pool is provided
/// - `"memory"` (default): a `MemoryNotificationStore`
pub fn create_notification_store(
    config: &StoreConfig,
    pg_pool: Option<PgPool>,
) -> Arc<dyn NotificationStore> {
    match config.backend.as_str() {
        "postgres" => {
            if let Some(pool) = pg_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL notification store");
                Arc::new(PostgresNotificationStore::new(pool))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryNotificationStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory notification store");
            Arc::new(MemoryNotificationStore::new())
        }
    }
}
