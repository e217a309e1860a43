//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{html_body, subject_line, Notifier, NotifyError, Result};
use crate::config::NotifyConfig;
use crate::store::MatchGroup;

/// Sends match notifications through an SMTP relay.
#[derive(Debug)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build the notifier from configuration. Credentials come from the
    /// `SMTP_USERNAME` / `SMTP_PASSWORD` environment variables when both
    /// are present; otherwise the connection is unauthenticated.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        if let Some(port) = config.smtp_port {
            builder = builder.port(port);
        }

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, group: &MatchGroup) -> Result<()> {
        let to: Mailbox = group
            .email
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Compose(e.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject_line())
            .header(ContentType::TEXT_HTML)
            .body(html_body(&group.certs))
            .map_err(|e| NotifyError::Compose(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        info!(
            channel = "smtp",
            email = %group.email,
            certificates = group.certs.len(),
            "notification delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "smtp"
    }
}
