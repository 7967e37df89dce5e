//! Outbound mail transports.
//!
//! - `SmtpMailer`: delivery through an SMTP relay using lettre
//! - `LogMailer`: logs the message instead of sending it (development)
//!
//! Use `create_mailer()` to pick the transport from configuration.

mod log;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::MailConfig;

pub use self::log::LogMailer;
pub use smtp::SmtpMailer;

/// Errors raised by a mail transport.
#[derive(Debug, Error)]
pub enum MailError {
    /// Sender or recipient address could not be parsed
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// Relay rejected the message or the connection failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport misconfigured
    #[error("Mail configuration error: {0}")]
    Config(String),
}

/// Delivers a rendered HTML e-mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `html_body` to `to` with the given subject.
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// Create a mailer based on configuration.
///
/// - `"smtp"`: an `SmtpMailer` for the configured relay
/// - `"log"` (default): a `LogMailer`
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.transport.as_str() {
        "smtp" => {
            tracing::info!(
                transport = "smtp",
                host = %config.host,
                port = config.port,
                tls = config.use_tls,
                "Creating SMTP mailer"
            );
            Ok(Arc::new(SmtpMailer::new(config.clone())?))
        }
        _ => {
            tracing::info!(transport = "log", "Creating log mailer");
            Ok(Arc::new(LogMailer::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_defaults_to_log() {
        let mailer = create_mailer(&MailConfig::default()).unwrap();
        assert_eq!(mailer.name(), "log");
    }
}
