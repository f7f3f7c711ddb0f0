// Outbound event payloads and publisher seam

pub mod logger;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::errors::AuthError;

/// Kind of templated email a flow can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

impl EmailKind {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailKind::Verification => "Verify your email address",
            EmailKind::PasswordReset => "Reset your password",
        }
    }
}

/// Email event handed to the outbound publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub to: String,
    pub subject: String,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub from: Option<String>,
    pub kind: EmailKind,
    pub metadata: HashMap<String, String>,
    pub occurred_on: DateTime<Utc>,
}

/// Builds email events from a kind, recipient, and template metadata.
pub trait EmailFactory: Send + Sync {
    fn create(
        &self,
        kind: EmailKind,
        to: &str,
        metadata: HashMap<String, String>,
    ) -> Result<EmailEvent, AuthError>;
}

/// Factory rendering built-in `{{placeholder}}` templates.
pub struct TemplateEmailFactory;

const VERIFICATION_TEMPLATE: &str = "<p>Hello {{name}},</p>\
<p>Confirm your email address with this token: <strong>{{token}}</strong></p>";

const PASSWORD_RESET_TEMPLATE: &str = "<p>Hello,</p>\
<p>Use this token to reset your password: <strong>{{token}}</strong></p>\
<p>If you did not request a reset, ignore this message.</p>";

impl EmailFactory for TemplateEmailFactory {
    fn create(
        &self,
        kind: EmailKind,
        to: &str,
        metadata: HashMap<String, String>,
    ) -> Result<EmailEvent, AuthError> {
        let template = match kind {
            EmailKind::Verification => VERIFICATION_TEMPLATE,
            EmailKind::PasswordReset => PASSWORD_RESET_TEMPLATE,
        };
        let mut html = template.to_string();
        for (key, value) in &metadata {
            html = html.replace(&format!("{{{{{key}}}}}"), value);
        }
        Ok(EmailEvent {
            to: to.to_string(),
            subject: kind.subject().to_string(),
            body: None,
            html_body: Some(html),
            from: None,
            kind,
            metadata,
            occurred_on: Utc::now(),
        })
    }
}

/// Outbound publisher seam. Verification/reset flows await the publish
/// inline and propagate failures into the surrounding transaction.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EmailEvent, ct: &CancellationToken) -> Result<(), AuthError>;
}

/// Channel-backed publisher for tests and single-process deployments.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<EmailEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmailEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: EmailEvent, ct: &CancellationToken) -> Result<(), AuthError> {
        if ct.is_cancelled() {
            return Err(AuthError::Publish("publish cancelled".to_string()));
        }
        self.tx
            .send(event)
            .map_err(|e| AuthError::Publish(format!("channel closed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let factory = TemplateEmailFactory;
        let mut metadata = HashMap::new();
        metadata.insert("name".to_string(), "Ada".to_string());
        metadata.insert("token".to_string(), "tok123".to_string());

        let event = factory
            .create(EmailKind::Verification, "ada@example.com", metadata)
            .unwrap();
        let html = event.html_body.unwrap();
        assert!(html.contains("Hello Ada"));
        assert!(html.contains("tok123"));
        assert!(!html.contains("{{"));
        assert_eq!(event.subject, "Verify your email address");
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let factory = TemplateEmailFactory;
        let event = factory
            .create(EmailKind::PasswordReset, "x@example.com", HashMap::new())
            .unwrap();

        let ct = CancellationToken::new();
        publisher.publish(event, &ct).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.to, "x@example.com");
        assert_eq!(received.kind, EmailKind::PasswordReset);
    }

    #[tokio::test]
    async fn test_publish_rejects_cancelled_token() {
        let (publisher, _rx) = ChannelPublisher::new();
        let event = TemplateEmailFactory
            .create(EmailKind::Verification, "x@example.com", HashMap::new())
            .unwrap();

        let ct = CancellationToken::new();
        ct.cancel();
        assert!(publisher.publish(event, &ct).await.is_err());
    }
}
