//! ntfy Sink
//!
//! Implementation of NotificationSink for an ntfy server using reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::cli::config::NtfyConfig;
use crate::error::NotifyError;
use crate::notify::sink::{Notification, NotificationSink};

/// Request body of the ntfy JSON publish API
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    topic: &'a str,
    markdown: bool,
    title: &'a str,
    message: String,
    tags: &'a [String],
    priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
}

/// ntfy push-notification sink
pub struct NtfySink {
    client: reqwest::Client,
    url: String,
    topic: String,
    default_priority: u8,
    icon: Option<String>,
}

impl NtfySink {
    /// Create a sink from the ntfy configuration section
    pub fn new(config: &NtfyConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.token.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", config.token))
                    .context("Invalid ntfy token")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build ntfy HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
            topic: config.topic.clone(),
            default_priority: config.default_priority,
            icon: config.icon.clone().filter(|icon| !icon.is_empty()),
        })
    }
}

#[async_trait]
impl NotificationSink for NtfySink {
    fn name(&self) -> &str {
        "ntfy"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = PublishRequest {
            topic: &self.topic,
            markdown: true,
            title: &notification.title,
            message: format!("---\n{}", notification.message),
            tags: &notification.tags,
            priority: notification.priority.unwrap_or(self.default_priority),
            icon: self.icon.as_deref(),
        };

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }

        debug!(topic = %self.topic, status = %status, "ntfy accepted notification");
        Ok(())
    }
}
