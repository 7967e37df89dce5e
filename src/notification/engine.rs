use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::error::{AppError, Result};
use crate::mail::Mailer;
use crate::metrics::{DeliveryMetrics, LifecycleMetrics};
use crate::store::NotificationStore;
use crate::template::TemplateRenderer;

use super::delivery::{DeliveryOutcome, DeliveryTask, InterruptSignal};
use super::{NewNotification, Notification, NotificationStatus};

/// Statistics for the notification engine
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Records persisted through `create`
    pub created: AtomicU64,
    /// Sequences that ended with an accepted send
    pub sent: AtomicU64,
    /// Sequences skipped for blank title or recipient
    pub skipped: AtomicU64,
    /// Sequences that ran out of attempts
    pub exhausted: AtomicU64,
    /// Sequences aborted by shutdown
    pub interrupted: AtomicU64,
    /// Sends that used the fallback body
    pub fallbacks: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent { used_fallback, .. } => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                if *used_fallback {
                    self.fallbacks.fetch_add(1, Ordering::Relaxed);
                }
            }
            DeliveryOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryOutcome::Exhausted { .. } => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryOutcome::Interrupted { .. } => {
                self.interrupted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub created: u64,
    pub sent: u64,
    pub skipped: u64,
    pub exhausted: u64,
    pub interrupted: u64,
    pub fallbacks: u64,
}

/// Creates notification records, dispatches their e-mail delivery in the
/// background and manages the status lifecycle.
pub struct NotificationEngine {
    store: Arc<dyn NotificationStore>,
    renderer: Arc<dyn TemplateRenderer>,
    mailer: Arc<dyn Mailer>,
    config: DeliveryConfig,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        renderer: Arc<dyn TemplateRenderer>,
        mailer: Arc<dyn Mailer>,
        config: DeliveryConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            renderer,
            mailer,
            config,
            shutdown_tx,
            shutting_down: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn store(&self) -> Arc<dyn NotificationStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Persist a new `PENDING` notification and dispatch it in the background.
    pub async fn create_notification(
        &self,
        title: &str,
        message: &str,
        recipient_email: &str,
        notification_type: &str,
        associated_user: Option<Uuid>,
    ) -> Result<Notification> {
        let mut request = NewNotification::new(title, message, recipient_email, notification_type);
        request.associated_user = associated_user;
        self.create(request).await
    }

    /// Persist a notification built from `request` and dispatch it.
    ///
    /// Returns as soon as the record is stored; delivery runs on its own task.
    /// If the store write fails nothing is dispatched.
    #[tracing::instrument(
        name = "engine.create",
        skip(self, request),
        fields(recipient = %request.recipient_email, notification_type = %request.notification_type)
    )]
    pub async fn create(&self, request: NewNotification) -> Result<Notification> {
        let notification = self.store.save(Notification::from_request(request)).await?;

        self.stats.created.fetch_add(1, Ordering::Relaxed);
        DeliveryMetrics::record_created();
        tracing::info!(
            notification_id = %notification.id,
            template = ?notification.template_name,
            "Notification created, dispatching delivery"
        );

        self.spawn_delivery(notification.clone());
        Ok(notification)
    }

    /// Run a delivery sequence for `notification` on a new task.
    pub fn spawn_delivery(&self, notification: Notification) -> JoinHandle<DeliveryOutcome> {
        let task = self.delivery_task(notification);
        tokio::spawn(task.run())
    }

    /// Run a delivery sequence for `notification` on the current task.
    pub async fn deliver(&self, notification: Notification) -> DeliveryOutcome {
        self.delivery_task(notification).run().await
    }

    fn delivery_task(&self, notification: Notification) -> DeliveryTask {
        DeliveryTask {
            notification,
            store: self.store.clone(),
            renderer: self.renderer.clone(),
            mailer: self.mailer.clone(),
            config: self.config.clone(),
            interrupt: InterruptSignal::new(
                self.shutdown_tx.subscribe(),
                self.shutting_down.clone(),
            ),
            stats: self.stats.clone(),
        }
    }

    #[tracing::instrument(name = "engine.mark_as_read", skip(self), fields(notification_id = %id))]
    pub async fn mark_as_read(&self, id: Uuid) -> Result<Notification> {
        let mut notification = self.load(id).await?;
        notification.mark_read();
        let saved = self.store.save(notification).await?;

        LifecycleMetrics::record_transition(NotificationStatus::Read);
        tracing::debug!(notification_id = %id, "Notification marked as read");
        Ok(saved)
    }

    #[tracing::instrument(name = "engine.update_status", skip(self), fields(notification_id = %id))]
    pub async fn update_status(&self, id: Uuid, status: NotificationStatus) -> Result<Notification> {
        let mut notification = self.load(id).await?;
        let previous = notification.status;
        notification.set_status(status);
        let saved = self.store.save(notification).await?;

        LifecycleMetrics::record_transition(status);
        tracing::debug!(
            notification_id = %id,
            from = %previous,
            to = %status,
            "Notification status updated"
        );
        Ok(saved)
    }

    /// Soft delete: the record stays in the store as `DELETED` until purged.
    #[tracing::instrument(name = "engine.delete", skip(self), fields(notification_id = %id))]
    pub async fn delete_notification(&self, id: Uuid) -> Result<()> {
        self.update_status(id, NotificationStatus::Deleted).await?;
        Ok(())
    }

    /// Physically remove every `DELETED` record; returns how many were removed.
    #[tracing::instrument(name = "engine.purge", skip(self))]
    pub async fn purge_deleted_notifications(&self) -> Result<usize> {
        let deleted: Vec<Notification> = self
            .store
            .find_all()
            .await?
            .into_iter()
            .filter(|n| n.status == NotificationStatus::Deleted)
            .collect();

        if deleted.is_empty() {
            tracing::debug!("No deleted notifications to purge");
            return Ok(0);
        }

        let removed = self.store.delete_all(&deleted).await?;
        LifecycleMetrics::record_purged(removed);
        tracing::info!(purged = removed, "Purged deleted notifications");
        Ok(removed)
    }

    /// Mark every unread record of `recipient_email` as read.
    ///
    /// Runs as one batch statement in the store.
    #[tracing::instrument(name = "engine.mark_all_as_read", skip(self))]
    pub async fn mark_all_as_read(&self, recipient_email: &str) -> Result<usize> {
        let updated = self.store.mark_all_read(recipient_email).await?;

        LifecycleMetrics::record_transitions(NotificationStatus::Read, updated);
        tracing::info!(recipient = %recipient_email, updated, "Marked all notifications as read");
        Ok(updated)
    }

    /// Move every record of `recipient_email` in status `from` to `to`.
    ///
    /// Runs as one batch statement in the store.
    #[tracing::instrument(name = "engine.bulk_update_status", skip(self))]
    pub async fn bulk_update_status(
        &self,
        recipient_email: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<usize> {
        let updated = self
            .store
            .update_status_by_recipient(recipient_email, from, to)
            .await?;

        LifecycleMetrics::record_transitions(to, updated);
        tracing::info!(
            recipient = %recipient_email,
            from = %from,
            to = %to,
            updated,
            "Bulk status update complete"
        );
        Ok(updated)
    }

    /// Signal in-flight deliveries to stop at their next backoff sleep.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let receivers = self.shutdown_tx.send(()).unwrap_or(0);
        tracing::info!(receivers, "Notification engine shutting down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    async fn load(&self, id: Uuid) -> Result<Notification> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound(id))
    }
}
