use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use lms_notification_service::config::Settings;
use lms_notification_service::mail::create_mailer;
use lms_notification_service::metrics::serve_metrics;
use lms_notification_service::notification::NotificationEngine;
use lms_notification_service::store::{connect_pool, create_notification_store};
use lms_notification_service::tasks::PurgeTask;
use lms_notification_service::telemetry::init_telemetry;
use lms_notification_service::template::TemplateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        store = %settings.store.backend,
        mail = %settings.mail.transport,
        "Configuration loaded"
    );

    // Notification store
    let pg_pool = if settings.store.backend == "postgres" {
        Some(connect_pool(&settings.database).await?)
    } else {
        None
    };
    let store = create_notification_store(&settings.store, pg_pool);

    // Templates
    let templates = TemplateStore::with_defaults();
    if let Some(dir) = &settings.templates.dir {
        let loaded = templates.load_dir(dir)?;
        tracing::info!(dir = %dir, loaded, "Templates loaded from directory");
    }

    // Mail transport
    let mailer = create_mailer(&settings.mail)?;

    let engine = Arc::new(NotificationEngine::new(
        store,
        Arc::new(templates),
        mailer,
        settings.delivery.clone(),
    ));
    tracing::info!(
        max_retry_attempts = settings.delivery.max_retry_attempts,
        retry_delay_ms = settings.delivery.retry_delay_ms,
        "Notification engine ready"
    );

    // Start purge task in background
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let purge_task = PurgeTask::new(settings.purge.clone(), engine.clone(), shutdown_tx.subscribe());
    let purge_handle = tokio::spawn(purge_task.run());

    // Prometheus scrape endpoint
    let metrics_handle = if settings.metrics.enabled {
        let listener = TcpListener::bind(&settings.metrics.bind_addr).await?;
        Some(tokio::spawn(serve_metrics(listener, shutdown_tx.subscribe())))
    } else {
        None
    };

    shutdown_signal_handler().await;

    // Stop in-flight retries and background tasks
    engine.shutdown();
    let _ = shutdown_tx.send(());

    tracing::info!("Waiting for background tasks to finish...");
    let _ = purge_handle.await;
    if let Some(handle) = metrics_handle {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Metrics endpoint failed"),
            Err(e) => tracing::error!(error = %e, "Metrics endpoint task panicked"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!(stats = ?engine.stats(), "Notification service shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
