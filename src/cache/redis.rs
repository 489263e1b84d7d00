//! Redis cache backend
//!
//! Persists the model-index document under a configured key with a TTL.
//! Useful when multiple gateway replicas should share one warm cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{ModelCache, ModelCacheDoc, CACHE_VERSION};
use crate::core::Result;

/// Default key for the model-index document
pub const DEFAULT_REDIS_KEY: &str = "gomodel:models";
/// Default TTL for the cached document (24 hours)
pub const DEFAULT_REDIS_TTL: Duration = Duration::from_secs(86_400);

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
    pub key: String,
    pub ttl: Duration,
}

impl RedisCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: DEFAULT_REDIS_KEY.to_string(),
            ttl: DEFAULT_REDIS_TTL,
        }
    }
}

/// Redis-backed model cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key: String,
    ttl: Duration,
}

impl RedisCache {
    /// Connect to Redis. The connection manager reconnects on its own; this
    /// only fails when the URL is unusable or the initial handshake fails.
    pub async fn connect(config: RedisCacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: config.key,
            ttl: config.ttl,
        })
    }
}

#[async_trait]
impl ModelCache for RedisCache {
    async fn get(&self) -> Result<Option<ModelCacheDoc>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(&self.key).await?;

        let Some(data) = data else {
            return Ok(None);
        };

        let doc: ModelCacheDoc = match serde_json::from_str(&data) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(key = %self.key, error = %e, "cached model document is corrupt, ignoring");
                return Ok(None);
            }
        };

        if doc.version != CACHE_VERSION {
            warn!(
                key = %self.key,
                version = doc.version,
                expected = CACHE_VERSION,
                "cached model document version mismatch, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(doc))
    }

    async fn set(&self, doc: &ModelCacheDoc) -> Result<()> {
        let data = serde_json::to_string(doc)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&self.key, data, self.ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn close(&self) {
        // The connection manager tears down with the last clone.
    }
}
