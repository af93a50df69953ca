//! Outbound account notifications.
//!
//! Delivery is behind the [`Notifier`] port; this crate ships a logging
//! notifier for local runs and a recording notifier for tests. Jobs are
//! handed to a [`NotificationDispatcher`] which owns the worker task.

pub mod dispatcher;

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use url::Url;

pub use dispatcher::{
    DeliveryReceipt, DispatchStats, NotificationDispatcher,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
    #[error("notification queue is full")]
    QueueFull,
    #[error("notification dispatcher is shut down")]
    Closed,
    #[error("invalid site url: {0}")]
    InvalidSiteUrl(String),
}

/// Delivery port. Implementations must not retry on their own.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        to: &[String],
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

// Bodies carry live tokens.
impl fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: vec![to.into()],
            cc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Builds account emails with links into the public site.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    site_url: Url,
    token_ttl_hours: i64,
}

impl EmailTemplates {
    pub fn new(site_url: &str, token_ttl_hours: i64) -> Result<Self, NotifyError> {
        let site_url = Url::parse(site_url)
            .map_err(|err| NotifyError::InvalidSiteUrl(format!("{site_url}: {err}")))?;
        if site_url.cannot_be_a_base() {
            return Err(NotifyError::InvalidSiteUrl(site_url.to_string()));
        }
        Ok(Self {
            site_url,
            token_ttl_hours,
        })
    }

    fn link(&self, path: &str, token: &str) -> String {
        let mut url = self.site_url.clone();
        url.set_path(path);
        url.query_pairs_mut()
            .clear()
            .append_pair("verify_token", token);
        url.to_string()
    }

    pub fn verification(&self, to: &str, token: &str) -> EmailMessage {
        let link = self.link("/verify-account", token);
        EmailMessage::new(
            to,
            "Verify Your Account",
            format!(
                "Thank you for registering. Please verify your account by \
                 clicking the link below:\n\n{link}\n\nThis link will expire \
                 in {} hours.",
                self.token_ttl_hours
            ),
        )
    }

    pub fn password_reset(&self, to: &str, token: &str) -> EmailMessage {
        let link = self.link("/reset-password", token);
        EmailMessage::new(
            to,
            "Reset Password",
            format!(
                "You have requested to reset your password. Please click the \
                 link below to reset your password:\n\n{link}\n\nThis link \
                 will expire in {} hours.",
                self.token_ttl_hours
            ),
        )
    }

    pub fn password_reset_success(&self, to: &str) -> EmailMessage {
        EmailMessage::new(
            to,
            "Reset Password Success",
            "Your password has been reset. If you did not request this \
             change, contact support immediately.",
        )
    }
}

/// Writes a log line per message instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        to: &[String],
        cc: &[String],
        subject: &str,
        _body: &str,
    ) -> Result<(), NotifyError> {
        info!(?to, ?cc, subject, "notification (log only)");
        Ok(())
    }
}

/// Keeps every message in memory. Can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            *guard = failing;
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last_to(&self, address: &str) -> Option<EmailMessage> {
        self.sent()
            .into_iter()
            .rev()
            .find(|message| message.to.iter().any(|to| to == address))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        to: &[String],
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        if self.failing.lock().map(|guard| *guard).unwrap_or(false) {
            return Err(NotifyError::Delivery("recording notifier set to fail".into()));
        }
        if let Ok(mut guard) = self.sent.lock() {
            guard.push(EmailMessage {
                to: to.to_vec(),
                cc: cc.to_vec(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}

/// Pull the `verify_token` query value out of a message body.
pub fn extract_link_token(body: &str) -> Option<String> {
    body.split_whitespace()
        .filter_map(|word| Url::parse(word).ok())
        .find_map(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "verify_token")
                .map(|(_, value)| value.into_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_point_at_the_site() {
        let templates = EmailTemplates::new("https://clinic.example/app", 24).unwrap();
        let message = templates.verification("a@x.io", "abc123");
        assert_eq!(message.to, vec!["a@x.io".to_string()]);
        assert!(message.body.contains(
            "https://clinic.example/verify-account?verify_token=abc123"
        ));
        assert!(message.body.contains("24 hours"));
        assert_eq!(extract_link_token(&message.body).as_deref(), Some("abc123"));

        let reset = templates.password_reset("a@x.io", "zzz");
        assert!(reset.body.contains("/reset-password?verify_token=zzz"));
    }

    #[test]
    fn rejects_unusable_site_urls() {
        assert!(EmailTemplates::new("not a url", 24).is_err());
        assert!(EmailTemplates::new("mailto:a@x.io", 24).is_err());
    }

    #[tokio::test]
    async fn recording_notifier_can_fail() {
        let notifier = RecordingNotifier::new();
        notifier
            .send(&["a@x.io".into()], &[], "hi", "body")
            .await
            .unwrap();
        notifier.set_failing(true);
        assert!(notifier.send(&["a@x.io".into()], &[], "hi", "body").await.is_err());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.last_to("a@x.io").unwrap().subject, "hi");
    }
}
