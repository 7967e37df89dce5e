//! Backend trait for notification record storage.
//!
//! The dispatch engine and the query service only talk to storage through
//! this trait, so memory and PostgreSQL backends are interchangeable.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{Notification, NotificationStatus};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Stored row could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Storage for notification records, keyed by notification ID.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: in-flight delivery tasks and the
/// query service access the store concurrently.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Backend identifier for logging
    fn backend_type(&self) -> &'static str;

    /// Insert or replace a record, returning what was stored.
    async fn save(&self, notification: Notification) -> Result<Notification, StoreError>;

    /// Look up a record by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Every record in the store, in no particular order.
    async fn find_all(&self) -> Result<Vec<Notification>, StoreError>;

    /// Physically remove the given records in one batch.
    ///
    /// Returns the number of records removed.
    async fn delete_all(&self, notifications: &[Notification]) -> Result<usize, StoreError>;

    /// Set the status of record `id` to `status` only if it is currently
    /// `expected`, as a single atomic step.
    ///
    /// Returns `false` when the record is missing or in another status.
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: NotificationStatus,
        status: NotificationStatus,
    ) -> Result<bool, StoreError>;

    /// Mark every unread record of `recipient_email` as read in one batch.
    ///
    /// Returns the number of records changed.
    async fn mark_all_read(&self, recipient_email: &str) -> Result<usize, StoreError>;

    /// Move every record of `recipient_email` in status `from` to `to` in one
    /// batch. Returns the number of records changed.
    async fn update_status_by_recipient(
        &self,
        recipient_email: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<usize, StoreError>;

    /// Every record addressed to `recipient_email`, in no particular order.
    ///
    /// Backends with an index on the recipient should override this.
    async fn find_by_recipient(&self, recipient_email: &str) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|n| n.recipient_email == recipient_email)
            .collect())
    }
}
