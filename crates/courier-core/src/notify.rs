//! Offline-notification hook, invoked when a message is sent to a user
//! with no live session.

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Characters of message content carried in a notice.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineNotice {
    pub receiver_id: Uuid,
    pub sender_username: String,
    pub preview: String,
}

impl OfflineNotice {
    pub fn new(receiver_id: Uuid, sender_username: String, content: &str) -> Self {
        Self {
            receiver_id,
            sender_username,
            preview: content.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

#[async_trait]
pub trait OfflineNotifier: Send + Sync {
    async fn notify(&self, notice: OfflineNotice) -> Result<()>;
}

pub struct NoopNotifier;

#[async_trait]
impl OfflineNotifier for NoopNotifier {
    async fn notify(&self, notice: OfflineNotice) -> Result<()> {
        debug!(
            "no offline notifier configured, dropping notice for {}",
            notice.receiver_id
        );
        Ok(())
    }
}

/// Posts each notice as JSON to an external push service.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl OfflineNotifier for WebhookNotifier {
    async fn notify(&self, notice: OfflineNotice) -> Result<()> {
        let body = serde_json::to_vec(&notice)?;
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!(
                "notify webhook returned {} for {}",
                resp.status(),
                notice.receiver_id
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_truncated_on_char_boundary() {
        let content = "é".repeat(PREVIEW_CHARS + 20);
        let notice = OfflineNotice::new(Uuid::new_v4(), "alice".into(), &content);
        assert_eq!(notice.preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn short_content_is_kept_whole() {
        let notice = OfflineNotice::new(Uuid::new_v4(), "alice".into(), "hi");
        assert_eq!(notice.preview, "hi");
    }
}
