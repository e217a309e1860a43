//! Notification delivery for matched certificates.
//!
//! One message per (email, certificates) group, composed as HTML. Delivery
//! is fire-and-forget from the pipeline's point of view: a failed send is
//! logged and the permanent archive stays as it is.

pub mod email;
pub mod sendmail;

pub use email::SmtpNotifier;
pub use sendmail::SendmailNotifier;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};

use crate::cert::CertInfo;
use crate::store::MatchGroup;

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Error types for notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier configuration error: {0}")]
    Config(String),

    #[error("failed to compose message: {0}")]
    Compose(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// A delivery channel for match notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one grouped notification.
    async fn send(&self, group: &MatchGroup) -> Result<()>;

    /// Short channel label for log lines.
    fn channel_name(&self) -> &str;
}

/// Subject line for a notification batch. Runs are scheduled after
/// midnight over the previous day's growth, hence the day-back date.
pub fn subject_line() -> String {
    let date = Utc::now() - Duration::hours(24);
    format!(
        "[certwatch] New certificates {}.{}.{}",
        date.day(),
        date.month(),
        date.year()
    )
}

/// HTML body listing the identity fields of every matched certificate.
pub fn html_body(certs: &[CertInfo]) -> String {
    let mut body = String::from(
        "<head>\n\
         <style>\n\
         body { font-family: monospace; }\n\
         ul { font-weight: bold; list-style-type: none; }\n\
         li { font-weight: lighter; }\n\
         </style>\n\
         </head>\n\
         <body>\n\
         <h2>THIS EMAIL HAS BEEN AUTOMATICALLY GENERATED, DO NOT REPLY</h2>\n\
         <p>The following newly logged certificates match domains you monitor:</p>\n",
    );

    for cert in certs {
        body.push_str("<ul>");
        body.push_str(&cert.cn);
        body.push_str(&format!(
            "<li>Subject DN: {}</li><li>Serial: {}</li><li>Names: {}</li>",
            cert.dn, cert.serial, cert.san
        ));
        body.push_str("</ul>\n");
    }

    body.push_str("</body>\n");
    body
}
