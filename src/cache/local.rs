//! Local file cache backend
//!
//! Persists the model-index document as JSON on disk. Writes go through a
//! temp file followed by a rename so readers never observe a torn document.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use super::{ModelCache, ModelCacheDoc, CACHE_VERSION};
use crate::core::Result;

/// File-backed model cache
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ModelCache for LocalCache {
    async fn get(&self) -> Result<Option<ModelCacheDoc>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let doc: ModelCacheDoc = match serde_json::from_slice(&data) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "model cache file is corrupt, ignoring");
                return Ok(None);
            }
        };

        if doc.version != CACHE_VERSION {
            warn!(
                path = %self.path.display(),
                version = doc.version,
                expected = CACHE_VERSION,
                "model cache version mismatch, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(doc))
    }

    async fn set(&self, doc: &ModelCacheDoc) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedModel;
    use std::collections::HashMap;

    fn sample_doc() -> ModelCacheDoc {
        let mut models = HashMap::new();
        models.insert(
            "gpt-4o".to_string(),
            CachedModel {
                provider_type: "openai".to_string(),
                object: "model".to_string(),
                owned_by: "openai".to_string(),
                created: 1234567890,
            },
        );
        ModelCacheDoc::new(models)
    }

    #[tokio::test]
    async fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("nope.json"));
        assert!(cache.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("models.json"));

        cache.set(&sample_doc()).await.unwrap();
        let loaded = cache.get().await.unwrap().expect("document");
        assert_eq!(loaded.models.len(), 1);
        assert_eq!(loaded.models["gpt-4o"].provider_type, "openai");
    }

    #[tokio::test]
    async fn set_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("sub").join("nested").join("models.json"));
        cache.set(&sample_doc()).await.unwrap();
        assert!(cache.get().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn version_mismatch_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        let json = r#"{"version": 99, "updated_at": "2024-06-01T00:00:00Z", "models": {}}"#;
        tokio::fs::write(&path, json).await.unwrap();

        let cache = LocalCache::new(path);
        assert!(cache.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let cache = LocalCache::new(path);
        assert!(cache.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("models.json"));
        cache.set(&sample_doc()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("models.json")]);
    }
}
