use agentcore::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

/// Outbound message to a seller or agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub channel: Channel,
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

impl Notification {
    pub fn email(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: Channel::Email,
            to: to.into(),
            subject: Some(subject.into()),
            body: body.into(),
        }
    }
}

/// Delivery collaborator used by communication tasks
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), TaskError>;
}

/// Notifier that only writes the message to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), TaskError> {
        tracing::info!(
            notification_id = %notification.id,
            channel = ?notification.channel,
            to = %notification.to,
            subject = notification.subject.as_deref().unwrap_or(""),
            "Notification sent ({} chars)",
            notification.body.len()
        );
        Ok(())
    }
}
