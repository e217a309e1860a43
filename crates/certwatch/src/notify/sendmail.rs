//! Delivery through the local sendmail binary, for hosts that pipe mail
//! into an MTA instead of talking SMTP.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    AsyncSendmailTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{html_body, subject_line, Notifier, NotifyError, Result};
use crate::store::MatchGroup;

/// Sends match notifications through `/usr/sbin/sendmail -t`.
pub struct SendmailNotifier {
    transport: AsyncSendmailTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SendmailNotifier {
    pub fn new(from_address: &str) -> Result<Self> {
        let from: Mailbox = from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            transport: AsyncSendmailTransport::new(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
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
            channel = "sendmail",
            email = %group.email,
            certificates = group.certs.len(),
            "notification delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "sendmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_with_valid_sender() {
        assert!(SendmailNotifier::new("no-reply@example.com").is_ok());
    }

    #[test]
    fn new_rejects_bad_sender() {
        assert!(SendmailNotifier::new("broken").is_err());
    }
}
