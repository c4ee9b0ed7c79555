//! Notification Sink Trait
//!
//! Defines the interface every push-notification backend implements and the
//! fire-and-forget dispatcher used by the connection loop.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::NotifyError;

/// A human-readable alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// Markdown body
    pub message: String,
    pub tags: Vec<String>,
    pub priority: Option<u8>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            tags: Vec::new(),
            priority: None,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Push-notification backend
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &str;

    /// Deliver one notification
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sink that only logs, used for dry runs
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            title = %notification.title,
            message = %notification.message,
            tags = ?notification.tags,
            "Notification (dry run)"
        );
        Ok(())
    }
}

/// Hands notifications to a sink without waiting for delivery.
///
/// Every send runs in its own task. A failed send is logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Spawn delivery of a notification
    pub fn dispatch(&self, notification: Notification) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            match sink.send(&notification).await {
                Ok(()) => debug!(sink = sink.name(), title = %notification.title, "Notification sent"),
                Err(e) => warn!(
                    sink = sink.name(),
                    title = %notification.title,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        });
    }
}
