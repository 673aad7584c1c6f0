//! HTTP adapter for the external media-scoring service (one call per URL)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Classification, MediaClassifier};
use crate::error::{ModerationError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreMediaRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreResponse {
    safe: bool,
    confidence: f32,
    #[serde(default)]
    categories: Vec<String>,
}

pub struct HttpMediaClassifier {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpMediaClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaClassifier for HttpMediaClassifier {
    async fn score_media(&self, url: &str) -> Result<Classification> {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&ScoreMediaRequest { url })
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                ModerationError::Classifier(format!(
                    "media classifier timed out after {:?} for {}",
                    self.timeout, url
                ))
            })??
            .error_for_status()?;

        let scored: ScoreResponse = response.json().await?;
        debug!(
            url = %url,
            safe = scored.safe,
            confidence = scored.confidence,
            "Media classifier scored"
        );

        Ok(Classification {
            safe: scored.safe,
            confidence: scored.confidence.clamp(0.0, 1.0),
            reasons: scored.categories,
        })
    }
}
