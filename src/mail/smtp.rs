//! SMTP mail transport using lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::MailConfig;

use super::{MailError, Mailer};

/// SMTP mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        let from = sender_mailbox(&config)?;
        let transport = build_transport(&config)?;
        Ok(Self {
            transport,
            from,
            config,
        })
    }

    fn build_message(&self, to: &str, subject: &str, html_body: &str) -> Result<Message, MailError> {
        let to: Mailbox = to.parse().map_err(|e| MailError::InvalidAddress {
            address: to.to_string(),
            reason: format!("{}", e),
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

fn sender_mailbox(config: &MailConfig) -> Result<Mailbox, MailError> {
    let address = format!("{} <{}>", config.from_name, config.from_email);
    address.parse().map_err(|e| MailError::InvalidAddress {
        address,
        reason: format!("{}", e),
    })
}

fn build_transport(config: &MailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let mut builder = if config.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Config(format!("Failed to create SMTP relay: {}", e)))?
    } else {
        // Plain connection for local relays such as Mailpit
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
    };

    builder = builder
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout_seconds)));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        tracing::debug!(
            to = %to,
            subject = %subject,
            host = %self.config.host,
            port = self.config.port,
            "Sending e-mail via SMTP"
        );

        let message = self.build_message(to, subject, html_body)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(
            to = %to,
            code = %response.code(),
            "SMTP relay accepted message"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
