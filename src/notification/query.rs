//! Read paths over notification records, scoped to one recipient.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::NotificationStore;

use super::{Notification, NotificationCounts, NotificationStatus};

pub struct NotificationQueryService {
    store: Arc<dyn NotificationStore>,
}

impl NotificationQueryService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// All records of the recipient, newest first
    pub async fn get_user_notifications(&self, recipient_email: &str) -> Result<Vec<Notification>> {
        let mut notifications = self.store.find_by_recipient(recipient_email).await?;
        sort_newest_first(&mut notifications);
        Ok(notifications)
    }

    /// Records that are unread by flag or still `PENDING`, each listed once,
    /// newest first.
    pub async fn get_unread_notifications(&self, recipient_email: &str) -> Result<Vec<Notification>> {
        let mut unread: Vec<Notification> = self
            .store
            .find_by_recipient(recipient_email)
            .await?
            .into_iter()
            .filter(Notification::is_unread)
            .collect();

        sort_newest_first(&mut unread);
        Ok(unread)
    }

    pub async fn get_notifications_by_status(
        &self,
        recipient_email: &str,
        status: NotificationStatus,
    ) -> Result<Vec<Notification>> {
        self.filtered(recipient_email, |n| n.status == status).await
    }

    pub async fn get_notifications_by_type(
        &self,
        recipient_email: &str,
        notification_type: &str,
    ) -> Result<Vec<Notification>> {
        self.filtered(recipient_email, |n| n.notification_type == notification_type)
            .await
    }

    /// Records created within `[from, to]`, both ends inclusive
    pub async fn get_notifications_between(
        &self,
        recipient_email: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        self.filtered(recipient_email, |n| n.created_at >= from && n.created_at <= to)
            .await
    }

    pub async fn count_notifications(&self, recipient_email: &str) -> Result<NotificationCounts> {
        let total = self.store.find_by_recipient(recipient_email).await?.len();
        let unread = self.get_unread_notifications(recipient_email).await?.len();
        Ok(NotificationCounts { unread, total })
    }

    pub async fn count_by_status(
        &self,
        recipient_email: &str,
        status: NotificationStatus,
    ) -> Result<usize> {
        Ok(self
            .get_notifications_by_status(recipient_email, status)
            .await?
            .len())
    }

    async fn filtered<F>(&self, recipient_email: &str, predicate: F) -> Result<Vec<Notification>>
    where
        F: Fn(&Notification) -> bool,
    {
        let mut notifications: Vec<Notification> = self
            .store
            .find_by_recipient(recipient_email)
            .await?
            .into_iter()
            .filter(|n| predicate(n))
            .collect();
        sort_newest_first(&mut notifications);
        Ok(notifications)
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
