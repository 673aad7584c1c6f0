//! Moderator notification boundary. Delivery is informational and
//! fire-and-forget; repeated delivery for the same flagged item is fine.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::ContentType;

/// Payload delivered to the moderator-facing channel for a flagged item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAlert {
    pub content_id: String,
    pub content_type: ContentType,
    pub confidence: f32,
    pub reasons: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_moderators(&self, alert: &ReviewAlert) -> Result<()>;
}

/// Posts review alerts to a configured webhook
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_moderators(&self, alert: &ReviewAlert) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;

        debug!(
            content_id = %alert.content_id,
            content_type = %alert.content_type,
            "Moderator alert delivered"
        );

        Ok(())
    }
}
