use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::PurgeConfig;
use crate::notification::NotificationEngine;

/// Background task that periodically removes soft-deleted notifications
pub struct PurgeTask {
    config: PurgeConfig,
    engine: Arc<NotificationEngine>,
    shutdown: broadcast::Receiver<()>,
}

impl PurgeTask {
    pub fn new(
        config: PurgeConfig,
        engine: Arc<NotificationEngine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            engine,
            shutdown,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self) {
        if !self.config.enabled {
            tracing::info!("Purge task disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        let mut timer = tokio::time::interval(interval);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.interval_seconds,
            "Purge task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Purge task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.purge().await;
                }
            }
        }

        tracing::info!("Purge task stopped");
    }

    async fn purge(&self) {
        match self.engine.purge_deleted_notifications().await {
            Ok(0) => {}
            Ok(purged) => {
                tracing::info!(purged = purged, "Scheduled purge removed deleted notifications");
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "Scheduled purge failed");
            }
        }
    }
}
