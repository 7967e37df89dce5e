//! E-mail delivery sequence for a single notification.
//!
//! A sequence makes up to `max_retry_attempts` attempts. Each attempt
//! resolves template variables, renders the template (falling back to a
//! minimal body on the final attempt) and hands the result to the mailer.
//! Failed attempts are followed by a linear backoff sleep; a shutdown signal
//! received during that sleep ends the sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::DeliveryConfig;
use crate::mail::{MailError, Mailer};
use crate::metrics::DeliveryMetrics;
use crate::store::NotificationStore;
use crate::telemetry::attributes;
use crate::template::{TemplateError, TemplateRenderer};

use super::engine::EngineStats;
use super::{Notification, NotificationStatus};

/// Why a delivery attempt failed
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Title or recipient missing; never retried
    #[error("Invalid notification data: {0}")]
    Validation(String),

    #[error("Template rendering failed: {0}")]
    Render(#[from] TemplateError),

    #[error("Template '{0}' rendered empty content")]
    EmptyRender(String),

    #[error("Mail transport failed: {0}")]
    Transport(#[from] MailError),
}

impl DeliveryError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Validation(_))
    }
}

/// Final result of a delivery sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The mailer accepted the message
    Sent { attempts: u32, used_fallback: bool },
    /// Title or recipient was blank; nothing was rendered or sent
    Skipped { reason: String },
    /// Every attempt failed
    Exhausted { attempts: u32, last_error: String },
    /// Shutdown was signalled during a backoff sleep
    Interrupted { attempt: u32 },
}

impl DeliveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent { .. } => "sent",
            DeliveryOutcome::Skipped { .. } => "skipped",
            DeliveryOutcome::Exhausted { .. } => "exhausted",
            DeliveryOutcome::Interrupted { .. } => "interrupted",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }
}

/// Shutdown signal observed at backoff boundaries.
pub(crate) struct InterruptSignal {
    receiver: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl InterruptSignal {
    pub(crate) fn new(receiver: broadcast::Receiver<()>, triggered: Arc<AtomicBool>) -> Self {
        Self { receiver, triggered }
    }

    /// Sleep for `delay`; returns `true` if shutdown was signalled first.
    async fn sleep(&mut self, delay: Duration) -> bool {
        if self.triggered.load(Ordering::Acquire) {
            return true;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => false,
            signal = self.receiver.recv() => match signal {
                // Engine dropped without signalling: finish the backoff normally
                Err(RecvError::Closed) => {
                    (&mut sleep).await;
                    false
                }
                _ => true,
            },
        }
    }
}

/// One delivery sequence, run on its own task.
pub(crate) struct DeliveryTask {
    pub(crate) notification: Notification,
    pub(crate) store: Arc<dyn NotificationStore>,
    pub(crate) renderer: Arc<dyn TemplateRenderer>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) config: DeliveryConfig,
    pub(crate) interrupt: InterruptSignal,
    pub(crate) stats: Arc<EngineStats>,
}

impl DeliveryTask {
    #[tracing::instrument(
        name = "delivery.run",
        skip(self),
        fields(
            notification_id = %self.notification.id,
            recipient = %self.notification.recipient_email
        )
    )]
    pub(crate) async fn run(mut self) -> DeliveryOutcome {
        let start = Instant::now();
        DeliveryMetrics::record_started();

        let outcome = self.deliver().await;

        let span = tracing::Span::current();
        for attribute in [
            attributes::notification_id(self.notification.id),
            attributes::outcome(outcome.label()),
        ] {
            span.set_attribute(attribute.key, attribute.value);
        }

        DeliveryMetrics::record_finished(outcome.label(), start.elapsed());
        self.stats.record(&outcome);
        outcome
    }

    async fn deliver(&mut self) -> DeliveryOutcome {
        let id = self.notification.id;
        let max_attempts = self.config.max_retry_attempts.max(1);

        if let Err(e) = validate(&self.notification) {
            tracing::error!(
                notification_id = %id,
                error = %e,
                "Invalid notification data, skipping delivery"
            );
            return DeliveryOutcome::Skipped {
                reason: e.to_string(),
            };
        }

        let mut attempt = 1;
        loop {
            tracing::info!(
                notification_id = %id,
                attempt = attempt,
                max_attempts = max_attempts,
                "Processing e-mail notification"
            );
            DeliveryMetrics::record_attempt();

            let last_attempt = attempt >= max_attempts;
            let error = match self.attempt(last_attempt).await {
                Ok(used_fallback) => {
                    tracing::info!(
                        notification_id = %id,
                        recipient = %self.notification.recipient_email,
                        attempt = attempt,
                        used_fallback = used_fallback,
                        "E-mail sent successfully"
                    );
                    if self.config.mark_sent_on_success {
                        self.mark_sent().await;
                    }
                    return DeliveryOutcome::Sent {
                        attempts: attempt,
                        used_fallback,
                    };
                }
                Err(e) => e,
            };

            tracing::warn!(
                notification_id = %id,
                attempt = attempt,
                error = %error,
                "Delivery attempt failed"
            );

            if last_attempt || !error.is_retryable() {
                tracing::error!(
                    notification_id = %id,
                    attempts = attempt,
                    last_error = %error,
                    "All delivery attempts failed"
                );
                return DeliveryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                };
            }

            let delay = self.config.backoff_for(attempt);
            if self.interrupt.sleep(delay).await {
                tracing::error!(
                    notification_id = %id,
                    attempt = attempt,
                    "Retry interrupted by shutdown"
                );
                return DeliveryOutcome::Interrupted { attempt };
            }

            attempt += 1;
        }
    }

    /// One render-and-send attempt; returns whether the fallback body was used.
    async fn attempt(&self, last_attempt: bool) -> Result<bool, DeliveryError> {
        let notification = &self.notification;
        let variables = resolve_variables(notification);
        let template_name = resolve_template_name(notification, &self.config.default_template);

        tracing::debug!(
            notification_id = %notification.id,
            template = %template_name,
            "Rendering template"
        );

        let (body, used_fallback) = match self.render(&template_name, &variables) {
            Ok(body) => (body, false),
            Err(e) if last_attempt => {
                tracing::error!(
                    notification_id = %notification.id,
                    template = %template_name,
                    error = %e,
                    "Template rendering failed on final attempt, using fallback body"
                );
                DeliveryMetrics::record_fallback();
                (fallback_body(&notification.title, &notification.message), true)
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id,
                    template = %template_name,
                    error = %e,
                    "Template rendering failed"
                );
                return Err(e);
            }
        };

        self.mailer
            .send(&notification.recipient_email, &notification.title, &body)
            .await?;

        Ok(used_fallback)
    }

    fn render(&self, template_name: &str, variables: &Map<String, Value>) -> Result<String, DeliveryError> {
        let body = self.renderer.render(template_name, variables)?;
        if body.trim().is_empty() {
            return Err(DeliveryError::EmptyRender(template_name.to_string()));
        }
        Ok(body)
    }

    /// Advance a still-pending record to `SENT`; a newer status is kept.
    async fn mark_sent(&self) {
        let id = self.notification.id;
        match self
            .store
            .update_status_if(id, NotificationStatus::Pending, NotificationStatus::Sent)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(notification_id = %id, "Notification no longer pending, status kept");
            }
            Err(e) => {
                tracing::warn!(notification_id = %id, error = %e, "Failed to mark notification as sent");
            }
        }
    }
}

fn validate(notification: &Notification) -> Result<(), DeliveryError> {
    if notification.is_deliverable() {
        Ok(())
    } else {
        Err(DeliveryError::Validation(
            "recipient email or title is empty".to_string(),
        ))
    }
}

/// Variable bag for rendering: `message` and `title`, then every key of the
/// template data object.
///
/// Unparseable template data is logged and ignored.
pub fn resolve_variables(notification: &Notification) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("message".to_string(), Value::String(notification.message.clone()));
    variables.insert("title".to_string(), Value::String(notification.title.clone()));

    let Some(raw) = notification.template_data.as_deref() else {
        return variables;
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(data)) => {
            tracing::debug!(
                notification_id = %notification.id,
                keys = ?data.keys().collect::<Vec<_>>(),
                "Template data processed"
            );
            variables.extend(data);
        }
        Ok(other) => {
            DeliveryMetrics::record_template_data_error();
            tracing::error!(
                notification_id = %notification.id,
                kind = json_kind(&other),
                "Template data is not an object, continuing with basic variables"
            );
        }
        Err(e) => {
            DeliveryMetrics::record_template_data_error();
            tracing::error!(
                notification_id = %notification.id,
                error = %e,
                "Failed to parse template data, continuing with basic variables"
            );
            tracing::debug!(notification_id = %notification.id, raw = %raw, "Raw template data");
        }
    }

    variables
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The notification's template name, or `default` when absent or blank
pub fn resolve_template_name(notification: &Notification, default: &str) -> String {
    match notification.template_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default.to_string(),
    }
}

/// Minimal HTML body used when rendering fails on the final attempt
pub fn fallback_body(title: &str, message: &str) -> String {
    format!("<html><body><h1>{}</h1><p>{}</p></body></html>", title, message)
}
