//! Read-through decision cache keyed by (content_type, content_id).
//!
//! A cache hit short-circuits re-classification entirely, so callers must
//! invalidate on edit or re-review. Review always invalidates.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tracing::debug;

use crate::error::{ModerationError, Result};
use crate::models::{ContentType, ModerationResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionCache: Send + Sync {
    async fn get(
        &self,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<Option<ModerationResult>>;

    async fn put(&self, result: &ModerationResult, ttl: Duration) -> Result<()>;

    async fn invalidate(&self, content_type: ContentType, content_id: &str) -> Result<()>;
}

/// Redis-backed decision cache
#[derive(Clone)]
pub struct RedisDecisionCache {
    redis: ConnectionManager,
}

impl RedisDecisionCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn decision_key(content_type: ContentType, content_id: &str) -> String {
        format!("moderation:v1:{}:{}", content_type.as_str(), content_id)
    }
}

#[async_trait]
impl DecisionCache for RedisDecisionCache {
    async fn get(
        &self,
        content_type: ContentType,
        content_id: &str,
    ) -> Result<Option<ModerationResult>> {
        let key = Self::decision_key(content_type, content_id);
        let mut conn = self.redis.clone();

        match conn.get::<_, Option<String>>(&key).await? {
            Some(data) => {
                debug!("Decision cache HIT for {}", key);
                let result = serde_json::from_str::<ModerationResult>(&data).map_err(|e| {
                    ModerationError::Cache(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(result))
            }
            None => {
                debug!("Decision cache MISS for {}", key);
                Ok(None)
            }
        }
    }

    async fn put(&self, result: &ModerationResult, ttl: Duration) -> Result<()> {
        let key = Self::decision_key(result.content_type, &result.content_id);
        let data = serde_json::to_string(result)?;

        // Jitter up to 10% of the TTL so cached decisions do not expire
        // in lockstep.
        let jitter = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter_secs = (ttl.as_secs_f64() * jitter).round() as u64;
        let final_ttl = ttl + Duration::from_secs(jitter_secs);

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&key, data, final_ttl.as_secs())
            .await?;

        debug!("Decision cache WRITE for {} with TTL {:?}", key, final_ttl);
        Ok(())
    }

    async fn invalidate(&self, content_type: ContentType, content_id: &str) -> Result<()> {
        let key = Self::decision_key(content_type, content_id);
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(&key).await?;

        debug!("Decision cache INVALIDATE for {}", key);
        Ok(())
    }
}
