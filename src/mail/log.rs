use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{MailError, Mailer};

/// Mailer that only logs outgoing messages.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: AtomicU64,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages "sent" so far
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            to = %to,
            subject = %subject,
            body_len = html_body.len(),
            "Mail transport disabled, logging message instead of sending"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
