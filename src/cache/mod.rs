//! Pluggable cache for the model index
//!
//! The registry persists a small serialized document mapping model ids to
//! provider type tags, so a restarted gateway can serve traffic before its
//! first network fetch completes. Loss of the document only costs startup
//! latency; the refresh loop rebuilds it.

pub mod local;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Result;

pub use local::LocalCache;
pub use redis::{RedisCache, RedisCacheConfig, DEFAULT_REDIS_KEY, DEFAULT_REDIS_TTL};

/// Current cache document version. A mismatch is treated as an absent
/// document; the refresh loop will rewrite it.
pub const CACHE_VERSION: u32 = 1;

/// One persisted model entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedModel {
    pub provider_type: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub owned_by: String,
    #[serde(default)]
    pub created: i64,
}

/// The serialized model-index document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCacheDoc {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub models: HashMap<String, CachedModel>,
}

impl ModelCacheDoc {
    pub fn new(models: HashMap<String, CachedModel>) -> Self {
        Self {
            version: CACHE_VERSION,
            updated_at: Utc::now(),
            models,
        }
    }
}

/// Persistence backend for the model-index document.
///
/// Absence of a document is not an error; `get` returns `None`.
#[async_trait]
pub trait ModelCache: Send + Sync {
    async fn get(&self) -> Result<Option<ModelCacheDoc>>;
    async fn set(&self, doc: &ModelCacheDoc) -> Result<()>;
    async fn close(&self) {}
}
