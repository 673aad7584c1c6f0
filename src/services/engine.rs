//! Moderation decision engine.
//!
//! Combines the text and media classifier verdicts into one decision,
//! persists and caches it, and escalates ambiguous outcomes to human
//! review. Classifier unavailability is recovered locally with
//! deterministic fallbacks; any other pipeline fault is recovered into a
//! flagged zero-confidence result that is persisted but never cached, so
//! the next pass retries classification. `moderate` never returns an
//! error to its caller.

use chrono::{DateTime, Utc};
use futures::future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::DecisionCache;
use crate::classifiers::{Classification, KeywordClassifier, MediaClassifier, TextClassifier};
use crate::db::DecisionStore;
use crate::error::{ModerationError, Result};
use crate::models::{
    ContentType, ModerationResult, ModerationStatus, PendingItem, ReviewDecision, StatsRow,
};
use crate::notifier::ReviewAlert;
use crate::queue::{JobKind, JobQueue, JobSpec};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Unsafe content above this confidence is rejected outright
    pub reject_threshold: f32,
    pub cache_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reject_threshold: 0.8,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Review-queue priority: numerically higher runs sooner, so lower
/// confidence maps to higher priority.
fn review_priority(confidence: f32) -> i64 {
    ((1.0 - confidence.clamp(0.0, 1.0)) * 100.0).round() as i64
}

pub struct ModerationEngine {
    text: Arc<dyn TextClassifier>,
    media: Arc<dyn MediaClassifier>,
    keyword_fallback: KeywordClassifier,
    cache: Arc<dyn DecisionCache>,
    store: Arc<dyn DecisionStore>,
    queue: Arc<dyn JobQueue>,
    settings: EngineSettings,
}

impl ModerationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        text: Arc<dyn TextClassifier>,
        media: Arc<dyn MediaClassifier>,
        keyword_fallback: KeywordClassifier,
        cache: Arc<dyn DecisionCache>,
        store: Arc<dyn DecisionStore>,
        queue: Arc<dyn JobQueue>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            text,
            media,
            keyword_fallback,
            cache,
            store,
            queue,
            settings,
        }
    }

    /// Classify one content item and return a definite decision.
    ///
    /// A cache hit short-circuits re-classification, so callers must only
    /// invoke this once per logical submission or invalidate on edit.
    pub async fn moderate(
        &self,
        content_id: &str,
        content_type: ContentType,
        text: &str,
        media_urls: &[String],
    ) -> ModerationResult {
        match self
            .moderate_inner(content_id, content_type, text, media_urls)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(
                    content_id = %content_id,
                    content_type = %content_type,
                    error = %e,
                    "Moderation pipeline fault, returning flagged safe-failure result"
                );

                let fallback = ModerationResult::error_fallback(content_id, content_type);
                // Persist best-effort, never cache: the next call must
                // retry classification instead of reusing this result.
                if let Err(persist_err) = self.store.upsert(&fallback).await {
                    error!(
                        content_id = %content_id,
                        error = %persist_err,
                        "Failed to persist safe-failure result"
                    );
                }
                fallback
            }
        }
    }

    async fn moderate_inner(
        &self,
        content_id: &str,
        content_type: ContentType,
        text: &str,
        media_urls: &[String],
    ) -> Result<ModerationResult> {
        if let Some(cached) = self.cache.get(content_type, content_id).await? {
            return Ok(cached);
        }

        let text_class = match self.text.score_text(text).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(
                    content_id = %content_id,
                    error = %e,
                    "Text classifier unavailable, using keyword fallback"
                );
                self.keyword_fallback.classify(text)
            }
        };

        let combined = if media_urls.is_empty() {
            text_class
        } else {
            let media_class = match self.score_media_round(media_urls).await {
                Ok(classification) => classification,
                Err(e) => {
                    warn!(
                        content_id = %content_id,
                        media_count = media_urls.len(),
                        error = %e,
                        "Media round failed, unscored media is not auto-approved"
                    );
                    Classification::media_fallback()
                }
            };
            text_class.merge(media_class)
        };

        let status = self.route(&combined);
        let result = ModerationResult::automated(content_id, content_type, status, combined);

        self.store.upsert(&result).await?;
        self.cache.put(&result, self.settings.cache_ttl).await?;

        if status == ModerationStatus::Flagged {
            self.escalate(&result).await?;
        }

        info!(
            content_id = %content_id,
            content_type = %content_type,
            status = %status,
            confidence = %result.confidence,
            "Content moderated"
        );

        Ok(result)
    }

    /// Score every media URL concurrently and fold into one verdict.
    /// A single failure fails the whole round.
    async fn score_media_round(&self, media_urls: &[String]) -> Result<Classification> {
        let scores =
            future::try_join_all(media_urls.iter().map(|url| self.media.score_media(url))).await?;

        Ok(Classification::combine(scores))
    }

    fn route(&self, classification: &Classification) -> ModerationStatus {
        if classification.safe {
            ModerationStatus::Approved
        } else if classification.confidence > self.settings.reject_threshold {
            ModerationStatus::Rejected
        } else {
            ModerationStatus::Flagged
        }
    }

    /// Enqueue exactly one human-review job for a flagged decision
    async fn escalate(&self, result: &ModerationResult) -> Result<()> {
        let alert = ReviewAlert {
            content_id: result.content_id.clone(),
            content_type: result.content_type,
            confidence: result.confidence,
            reasons: result.reasons.clone(),
        };
        let priority = review_priority(result.confidence);

        self.queue
            .enqueue(JobSpec::new(JobKind::HumanReview, serde_json::to_value(&alert)?)
                .with_priority(priority))
            .await?;

        info!(
            content_id = %result.content_id,
            content_type = %result.content_type,
            priority = priority,
            "Flagged content escalated for human review"
        );

        Ok(())
    }

    /// Validate a submission and enqueue its classification job
    pub async fn submit(
        &self,
        content_id: &str,
        content_type: ContentType,
        text: &str,
        media_urls: Vec<String>,
    ) -> Result<()> {
        if content_id.trim().is_empty() {
            return Err(ModerationError::InvalidInput(
                "content_id is required".to_string(),
            ));
        }
        if text.trim().is_empty() && media_urls.is_empty() {
            return Err(ModerationError::InvalidInput(
                "text or media is required".to_string(),
            ));
        }

        let payload = serde_json::json!({
            "contentId": content_id,
            "contentType": content_type,
            "text": text,
            "mediaUrls": media_urls,
        });

        self.queue
            .enqueue(JobSpec::new(JobKind::ContentModeration, payload))
            .await
    }

    /// Apply a human decision: update the record, enforce rejections by
    /// hiding the content, and invalidate the cache unconditionally so
    /// reads reflect the human decision rather than a stale automated one.
    pub async fn review(
        &self,
        content_id: &str,
        content_type: ContentType,
        reviewer_id: Uuid,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ModerationResult> {
        let updated = self
            .store
            .apply_review(content_id, content_type, reviewer_id, decision, notes)
            .await?;

        if decision == ReviewDecision::Rejected {
            self.store.set_hidden(content_id, content_type).await?;
        }

        self.cache.invalidate(content_type, content_id).await?;

        info!(
            content_id = %content_id,
            content_type = %content_type,
            reviewer_id = %reviewer_id,
            status = %updated.status,
            "Review recorded"
        );

        Ok(updated)
    }

    pub async fn get_result(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<ModerationResult> {
        self.store
            .get_current(content_id, content_type)
            .await?
            .ok_or_else(|| {
                ModerationError::NotFound(format!(
                    "No moderation result for {} {}",
                    content_type, content_id
                ))
            })
    }

    pub async fn get_history(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Vec<ModerationResult>> {
        self.store.get_history(content_id, content_type).await
    }

    pub async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<PendingItem>> {
        self.store.list_pending(limit, offset).await
    }

    pub async fn get_stats(&self, since: DateTime<Utc>) -> Result<Vec<StatsRow>> {
        self.store.aggregate_stats(since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockDecisionCache;
    use crate::classifiers::{MockMediaClassifier, MockTextClassifier};
    use crate::db::MockDecisionStore;
    use crate::queue::MockJobQueue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn keyword_fallback() -> (KeywordClassifier, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "spam").unwrap();
        writeln!(file, "scam").unwrap();
        let classifier = KeywordClassifier::new(file.path()).unwrap();
        (classifier, file)
    }

    fn class(safe: bool, confidence: f32, reasons: &[&str]) -> Classification {
        Classification {
            safe,
            confidence,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        }
    }

    struct EngineBuilder {
        text: MockTextClassifier,
        media: MockMediaClassifier,
        cache: MockDecisionCache,
        store: MockDecisionStore,
        queue: MockJobQueue,
    }

    impl EngineBuilder {
        fn new() -> Self {
            Self {
                text: MockTextClassifier::new(),
                media: MockMediaClassifier::new(),
                cache: MockDecisionCache::new(),
                store: MockDecisionStore::new(),
                queue: MockJobQueue::new(),
            }
        }

        fn cache_miss(mut self) -> Self {
            self.cache.expect_get().returning(|_, _| Ok(None));
            self
        }

        fn store_accepts(mut self) -> Self {
            self.store.expect_upsert().returning(|_| Ok(()));
            self
        }

        fn cache_accepts(mut self) -> Self {
            self.cache.expect_put().returning(|_, _| Ok(()));
            self
        }

        fn build(self) -> (ModerationEngine, NamedTempFile) {
            let (fallback, file) = keyword_fallback();
            let engine = ModerationEngine::new(
                Arc::new(self.text),
                Arc::new(self.media),
                fallback,
                Arc::new(self.cache),
                Arc::new(self.store),
                Arc::new(self.queue),
                EngineSettings::default(),
            );
            (engine, file)
        }
    }

    #[tokio::test]
    async fn test_safe_content_is_approved_without_escalation() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .times(1)
            .returning(|_| Ok(class(true, 0.95, &[])));
        b.queue.expect_enqueue().times(0);

        let (engine, _file) = b.build();
        let result = engine
            .moderate("c1", ContentType::Post, "hello world", &[])
            .await;

        assert_eq!(result.status, ModerationStatus::Approved);
        assert_eq!(result.confidence, 0.95);
        assert!(result.reasons.is_empty());
        assert!(result.automated);
    }

    #[tokio::test]
    async fn test_high_confidence_unsafe_is_rejected_without_review() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .returning(|_| Ok(class(false, 0.95, &["hate"])));
        b.queue.expect_enqueue().times(0);

        let (engine, _file) = b.build();
        let result = engine
            .moderate("c2", ContentType::Comment, "awful text", &[])
            .await;

        assert_eq!(result.status, ModerationStatus::Rejected);
        assert_eq!(result.reasons, vec!["hate".to_string()]);
    }

    #[tokio::test]
    async fn test_low_confidence_unsafe_is_flagged_and_escalated_once() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .returning(|_| Ok(class(false, 0.6, &["maybe_hate"])));
        b.queue
            .expect_enqueue()
            .times(1)
            .withf(|job| {
                job.kind == JobKind::HumanReview
                    && job.priority == 40
                    && job.payload["contentId"] == "c3"
            })
            .returning(|_| Ok(()));

        let (engine, _file) = b.build();
        let result = engine
            .moderate("c3", ContentType::Story, "borderline", &[])
            .await;

        assert_eq!(result.status, ModerationStatus::Flagged);
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_review_priority_is_inverse_to_confidence() {
        assert_eq!(review_priority(0.2), 80);
        assert_eq!(review_priority(0.5), 50);
        assert_eq!(review_priority(0.8), 20);
        assert!(review_priority(0.1) > review_priority(0.4));
        assert!(review_priority(0.4) > review_priority(0.9));
        // Out-of-range confidences are clamped
        assert_eq!(review_priority(-1.0), 100);
        assert_eq!(review_priority(2.0), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_classification() {
        let cached = ModerationResult::automated(
            "c4",
            ContentType::Post,
            ModerationStatus::Approved,
            class(true, 0.9, &[]),
        );

        let mut b = EngineBuilder::new();
        let hit = cached.clone();
        b.cache
            .expect_get()
            .times(1)
            .returning(move |_, _| Ok(Some(hit.clone())));
        b.text.expect_score_text().times(0);
        b.store.expect_upsert().times(0);
        b.queue.expect_enqueue().times(0);

        let (engine, _file) = b.build();
        let result = engine
            .moderate("c4", ContentType::Post, "same submission", &[])
            .await;

        assert_eq!(result.status, cached.status);
        assert_eq!(result.confidence, cached.confidence);
    }

    #[tokio::test]
    async fn test_media_round_combines_with_min_confidence() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .returning(|_| Ok(class(true, 0.9, &[])));
        b.media
            .expect_score_media()
            .times(3)
            .returning(|url| match url {
                "u1" => Ok(class(true, 0.9, &[])),
                "u2" => Ok(class(true, 0.4, &[])),
                _ => Ok(class(true, 0.95, &[])),
            });
        b.queue.expect_enqueue().times(0);

        let (engine, _file) = b.build();
        let urls: Vec<String> = ["u1", "u2", "u3"].iter().map(|s| s.to_string()).collect();
        let result = engine
            .moderate("c5", ContentType::Reel, "caption", &urls)
            .await;

        assert_eq!(result.status, ModerationStatus::Approved);
        assert_eq!(result.confidence, 0.4);
    }

    #[tokio::test]
    async fn test_media_round_failure_falls_back_pessimistically() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .returning(|_| Ok(class(true, 0.9, &[])));
        b.media.expect_score_media().returning(|url| {
            if url == "bad" {
                Err(ModerationError::Classifier("connection refused".to_string()))
            } else {
                Ok(class(true, 0.9, &[]))
            }
        });
        b.queue
            .expect_enqueue()
            .times(1)
            .withf(|job| job.kind == JobKind::HumanReview)
            .returning(|_| Ok(()));

        let (engine, _file) = b.build();
        let urls: Vec<String> = ["ok", "bad"].iter().map(|s| s.to_string()).collect();
        let result = engine
            .moderate("c6", ContentType::Reel, "caption", &urls)
            .await;

        // Unscored media is never auto-approved
        assert_eq!(result.status, ModerationStatus::Flagged);
        assert_eq!(result.confidence, 0.5);
        assert!(result.reasons.contains(&"media_review_required".to_string()));
    }

    #[tokio::test]
    async fn test_text_classifier_down_uses_keyword_fallback() {
        let mut b = EngineBuilder::new().cache_miss().store_accepts().cache_accepts();
        b.text
            .expect_score_text()
            .returning(|_| Err(ModerationError::Classifier("timed out".to_string())));
        b.queue.expect_enqueue().returning(|_| Ok(()));

        let (engine, _file) = b.build();

        // Banned keyword: punitive low-confidence unsafe call
        let flagged = engine
            .moderate("c7", ContentType::Post, "buy my spam now", &[])
            .await;
        assert_eq!(flagged.status, ModerationStatus::Flagged);
        assert_eq!(flagged.confidence, 0.3);
        assert_eq!(flagged.reasons, vec!["inappropriate_content".to_string()]);

        // No banned keyword: optimistic safe call
        let approved = engine
            .moderate("c8", ContentType::Post, "a lovely afternoon", &[])
            .await;
        assert_eq!(approved.status, ModerationStatus::Approved);
        assert_eq!(approved.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_pipeline_fault_yields_uncached_flagged_result() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut b = EngineBuilder::new().cache_miss();
        // Both calls must reach the classifier: the safe-failure result
        // never enters the cache, so the next call re-classifies.
        b.text
            .expect_score_text()
            .times(2)
            .returning(|_| Ok(class(true, 0.95, &[])));
        // First decision upsert fails; the safe-failure result is then
        // persisted best-effort, and the second call's upsert succeeds.
        let failed_once = AtomicBool::new(false);
        b.store.expect_upsert().times(3).returning(move |result| {
            if result.reasons.contains(&"moderation_error".to_string()) {
                Ok(())
            } else if !failed_once.swap(true, Ordering::SeqCst) {
                Err(ModerationError::Internal("db write failed".to_string()))
            } else {
                Ok(())
            }
        });
        // Only the second call's successful decision is cached
        b.cache.expect_put().times(1).returning(|_, _| Ok(()));
        b.queue.expect_enqueue().times(0);

        let (engine, _file) = b.build();
        let result = engine
            .moderate("c9", ContentType::Message, "hello", &[])
            .await;

        assert_eq!(result.status, ModerationStatus::Flagged);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasons, vec!["moderation_error".to_string()]);
        assert!(result.automated);

        let retried = engine
            .moderate("c9", ContentType::Message, "hello", &[])
            .await;
        assert_eq!(retried.status, ModerationStatus::Approved);
        assert_eq!(retried.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_review_rejection_enforces_and_invalidates() {
        let reviewer = Uuid::new_v4();
        let mut b = EngineBuilder::new();
        b.store
            .expect_apply_review()
            .times(1)
            .returning(move |id, ct, who, decision, _| {
                let mut result = ModerationResult::automated(
                    id,
                    ct,
                    decision.as_status(),
                    class(false, 0.6, &["maybe_hate"]),
                );
                result.automated = false;
                result.reviewed_by = Some(who);
                result.reviewed_at = Some(Utc::now());
                Ok(result)
            });
        b.store
            .expect_set_hidden()
            .times(1)
            .withf(|id, ct| id == "c10" && *ct == ContentType::Post)
            .returning(|_, _| Ok(()));
        b.cache
            .expect_invalidate()
            .times(1)
            .returning(|_, _| Ok(()));

        let (engine, _file) = b.build();
        let updated = engine
            .review("c10", ContentType::Post, reviewer, ReviewDecision::Rejected, None)
            .await
            .unwrap();

        assert_eq!(updated.status, ModerationStatus::Rejected);
        assert!(!updated.automated);
        assert_eq!(updated.reviewed_by, Some(reviewer));
    }

    #[tokio::test]
    async fn test_review_approval_invalidates_without_enforcement() {
        let mut b = EngineBuilder::new();
        b.store
            .expect_apply_review()
            .returning(|id, ct, who, decision, _| {
                let mut result = ModerationResult::automated(
                    id,
                    ct,
                    decision.as_status(),
                    class(false, 0.5, &[]),
                );
                result.automated = false;
                result.reviewed_by = Some(who);
                Ok(result)
            });
        b.store.expect_set_hidden().times(0);
        b.cache
            .expect_invalidate()
            .times(1)
            .returning(|_, _| Ok(()));

        let (engine, _file) = b.build();
        let updated = engine
            .review(
                "c11",
                ContentType::Comment,
                Uuid::new_v4(),
                ReviewDecision::Approved,
                Some("looks fine".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_enforcement_failure_surfaces_from_review() {
        let mut b = EngineBuilder::new();
        b.store
            .expect_apply_review()
            .returning(|id, ct, who, decision, _| {
                let mut result = ModerationResult::automated(
                    id,
                    ct,
                    decision.as_status(),
                    class(false, 0.9, &[]),
                );
                result.reviewed_by = Some(who);
                Ok(result)
            });
        b.store.expect_set_hidden().returning(|id, ct| {
            Err(ModerationError::Enforcement(format!(
                "No {} row found for content {}",
                ct, id
            )))
        });

        let (engine, _file) = b.build();
        let result = engine
            .review(
                "ghost",
                ContentType::Post,
                Uuid::new_v4(),
                ReviewDecision::Rejected,
                None,
            )
            .await;

        assert!(matches!(result, Err(ModerationError::Enforcement(_))));
    }

    #[tokio::test]
    async fn test_submit_validates_required_fields() {
        let mut b = EngineBuilder::new();
        b.queue
            .expect_enqueue()
            .times(1)
            .withf(|job| {
                job.kind == JobKind::ContentModeration && job.payload["contentId"] == "c12"
            })
            .returning(|_| Ok(()));

        let (engine, _file) = b.build();

        let missing_id = engine
            .submit("  ", ContentType::Post, "text", Vec::new())
            .await;
        assert!(matches!(missing_id, Err(ModerationError::InvalidInput(_))));

        let missing_body = engine
            .submit("c12", ContentType::Post, "", Vec::new())
            .await;
        assert!(matches!(missing_body, Err(ModerationError::InvalidInput(_))));

        engine
            .submit("c12", ContentType::Post, "hello", Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_result_not_found() {
        let mut b = EngineBuilder::new();
        b.store.expect_get_current().returning(|_, _| Ok(None));

        let (engine, _file) = b.build();
        let result = engine.get_result("missing", ContentType::Post).await;
        assert!(matches!(result, Err(ModerationError::NotFound(_))));
    }
}
