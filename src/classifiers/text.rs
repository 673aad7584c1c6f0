//! HTTP adapter for the external text-scoring service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Classification, TextClassifier};
use crate::error::{ModerationError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreTextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreResponse {
    safe: bool,
    confidence: f32,
    #[serde(default)]
    categories: Vec<String>,
}

impl From<ScoreResponse> for Classification {
    fn from(resp: ScoreResponse) -> Self {
        Classification {
            safe: resp.safe,
            confidence: resp.confidence.clamp(0.0, 1.0),
            reasons: resp.categories,
        }
    }
}

/// Calls the remote text classifier with a hard timeout. A timeout is
/// indistinguishable from any other failure at this boundary.
pub struct HttpTextClassifier {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTextClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TextClassifier for HttpTextClassifier {
    async fn score_text(&self, text: &str) -> Result<Classification> {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&ScoreTextRequest { text })
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                ModerationError::Classifier(format!(
                    "text classifier timed out after {:?}",
                    self.timeout
                ))
            })??
            .error_for_status()?;

        let scored: ScoreResponse = response.json().await?;
        debug!(
            safe = scored.safe,
            confidence = scored.confidence,
            "Text classifier scored"
        );

        Ok(scored.into())
    }
}
