//! In-memory notification store using DashMap.
//!
//! Records are lost on restart; intended for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::{Notification, NotificationStatus};

use super::backend::{NotificationStore, StoreError};

/// In-memory notification store.
pub struct MemoryNotificationStore {
    records: DashMap<Uuid, Notification>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of records held, including soft-deleted ones
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, notification: Notification) -> Result<Notification, StoreError> {
        self.records.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete_all(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        let removed = notifications
            .iter()
            .filter(|n| self.records.remove(&n.id).is_some())
            .count();

        tracing::debug!(
            removed = removed,
            remaining = self.records.len(),
            "Removed notifications from memory store"
        );

        Ok(removed)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: NotificationStatus,
        status: NotificationStatus,
    ) -> Result<bool, StoreError> {
        // The shard lock is held from the check through the write
        match self.records.get_mut(&id) {
            Some(mut entry) if entry.status == expected => {
                entry.set_status(status);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_email: &str) -> Result<usize, StoreError> {
        let mut updated = 0;
        for mut entry in self.records.iter_mut() {
            if entry.recipient_email == recipient_email && !entry.read {
                entry.mark_read();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_status_by_recipient(
        &self,
        recipient_email: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for mut entry in self.records.iter_mut() {
            if entry.recipient_email == recipient_email && entry.status == from {
                entry.set_status(to);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
