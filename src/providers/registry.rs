//! Model registry: the authoritative map from model id to owning provider
//!
//! Readers resolve against an immutable snapshot behind a single pointer
//! load and never take the builder lock. Builders assemble a fresh snapshot
//! in private state and install it with one pointer store, so a request
//! always resolves against exactly one consistent view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Provider;
use crate::cache::{CachedModel, ModelCache, ModelCacheDoc};
use crate::core::{GatewayError, Model, Result};

/// A registered provider plus its persistence type tag.
#[derive(Clone)]
struct RegisteredProvider {
    provider: Arc<dyn Provider>,
    type_tag: String,
}

/// One resolved model binding.
#[derive(Clone)]
pub struct ModelEntry {
    pub model: Model,
    pub provider: Arc<dyn Provider>,
    pub provider_type: String,
}

/// Immutable view installed by a builder; readers traverse without locks.
#[derive(Default)]
struct Snapshot {
    bindings: HashMap<String, ModelEntry>,
    /// Derived listing, sorted by model id for stable output.
    listing: Vec<Model>,
}

impl Snapshot {
    fn from_bindings(bindings: HashMap<String, ModelEntry>) -> Self {
        let mut listing: Vec<Model> = bindings.values().map(|e| e.model.clone()).collect();
        listing.sort_by(|a, b| a.id.cmp(&b.id));
        Self { bindings, listing }
    }
}

/// Cancellation handle for the background refresh task. Dropping it also
/// stops the task.
pub struct RefreshHandle {
    stop: watch::Sender<bool>,
}

impl RefreshHandle {
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }
}

/// The model registry (see module docs).
pub struct ModelRegistry {
    /// Registration order is preserved; the binary registers providers in
    /// sorted config-name order, which pins duplicate-id precedence.
    providers: RwLock<Vec<RegisteredProvider>>,
    snapshot: RwLock<Arc<Snapshot>>,
    /// At most one builder runs at a time.
    build_lock: tokio::sync::Mutex<()>,
    /// Set only after a successful network build.
    initialized: AtomicBool,
    cache: RwLock<Option<Arc<dyn ModelCache>>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            build_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            cache: RwLock::new(None),
        }
    }

    /// Register a provider without a persistence type tag (its models will
    /// not survive a cache roundtrip). Idempotent by pointer identity.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        self.register_provider_with_type(provider, "");
    }

    /// Register a provider under a persistence type tag. Does not touch the
    /// active snapshot. Idempotent by pointer identity.
    pub fn register_provider_with_type(&self, provider: Arc<dyn Provider>, type_tag: &str) {
        let mut providers = self.providers.write();
        if providers
            .iter()
            .any(|p| Arc::ptr_eq(&p.provider, &provider))
        {
            return;
        }
        providers.push(RegisteredProvider {
            provider,
            type_tag: type_tag.to_string(),
        });
    }

    /// Install a cache backend. Optional; without one the registry degrades
    /// to network-only bootstrap.
    pub fn set_cache(&self, cache: Arc<dyn ModelCache>) {
        *self.cache.write() = Some(cache);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    pub fn model_count(&self) -> usize {
        self.snapshot.read().bindings.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn supports(&self, model_id: &str) -> bool {
        self.snapshot.read().bindings.contains_key(model_id)
    }

    pub fn get_provider(&self, model_id: &str) -> Option<Arc<dyn Provider>> {
        self.snapshot
            .read()
            .bindings
            .get(model_id)
            .map(|e| e.provider.clone())
    }

    pub fn get_model(&self, model_id: &str) -> Option<ModelEntry> {
        self.snapshot.read().bindings.get(model_id).cloned()
    }

    /// Sorted model listing from the current snapshot.
    pub fn list_models(&self) -> Vec<Model> {
        self.snapshot.read().listing.clone()
    }

    fn install(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Synchronous build: fetch models from every provider and swap in a new
    /// snapshot. Fails only if every provider fails. On success the registry
    /// is marked initialized and the snapshot is persisted best-effort.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.build_lock.lock().await;
        let snapshot = self.build_snapshot().await?;
        self.install(snapshot);
        self.initialized.store(true, Ordering::Release);

        if let Err(e) = self.save_to_cache().await {
            warn!(error = %e, "failed to persist model cache");
        }
        Ok(())
    }

    /// Same algorithm as [`initialize`](Self::initialize); a fresh snapshot
    /// fully replaces the previous one, so models of providers that failed
    /// mid-refresh drop out. Never blocks readers.
    pub async fn refresh(&self) -> Result<()> {
        self.initialize().await
    }

    /// Fetch each provider's model list in registration order; first
    /// provider wins on duplicate ids.
    async fn build_snapshot(&self) -> Result<Snapshot> {
        let providers: Vec<RegisteredProvider> = self.providers.read().clone();

        let mut bindings: HashMap<String, ModelEntry> = HashMap::new();
        let mut succeeded = 0usize;

        for registered in &providers {
            let models = match registered.provider.list_models().await {
                Ok(resp) => resp.data,
                Err(e) => {
                    warn!(
                        provider_type = %registered.type_tag,
                        error = %e,
                        "provider list-models failed during registry build"
                    );
                    continue;
                }
            };
            succeeded += 1;

            for model in models {
                bindings.entry(model.id.clone()).or_insert_with(|| ModelEntry {
                    model,
                    provider: registered.provider.clone(),
                    provider_type: registered.type_tag.clone(),
                });
            }
        }

        if succeeded == 0 {
            return Err(GatewayError::Internal(
                "failed to fetch models from any provider".to_string(),
            ));
        }

        debug!(models = bindings.len(), providers = succeeded, "registry snapshot built");
        Ok(Snapshot::from_bindings(bindings))
    }

    /// Read the cache document and install bindings for every entry whose
    /// type tag matches a registered provider; other entries are silently
    /// discarded. Does not mark the registry initialized. Returns the number
    /// of models installed.
    pub async fn load_from_cache(&self) -> Result<usize> {
        let cache = match self.cache.read().clone() {
            Some(cache) => cache,
            None => return Ok(0),
        };

        let doc = match cache.get().await? {
            Some(doc) => doc,
            None => return Ok(0),
        };

        let providers: Vec<RegisteredProvider> = self.providers.read().clone();
        let mut bindings: HashMap<String, ModelEntry> = HashMap::new();

        for (model_id, cached) in doc.models {
            let Some(registered) = providers
                .iter()
                .find(|p| !p.type_tag.is_empty() && p.type_tag == cached.provider_type)
            else {
                continue;
            };

            bindings.insert(
                model_id.clone(),
                ModelEntry {
                    model: Model {
                        id: model_id,
                        object: if cached.object.is_empty() {
                            "model".to_string()
                        } else {
                            cached.object
                        },
                        created: cached.created,
                        owned_by: cached.owned_by,
                    },
                    provider: registered.provider.clone(),
                    provider_type: registered.type_tag.clone(),
                },
            );
        }

        let loaded = bindings.len();
        if loaded > 0 {
            self.install(Snapshot::from_bindings(bindings));
        }
        Ok(loaded)
    }

    /// Persist the current snapshot through the cache backend, if any.
    pub async fn save_to_cache(&self) -> Result<()> {
        let cache = match self.cache.read().clone() {
            Some(cache) => cache,
            None => return Ok(()),
        };

        let snapshot = self.snapshot.read().clone();
        let models: HashMap<String, CachedModel> = snapshot
            .bindings
            .iter()
            .filter(|(_, entry)| !entry.provider_type.is_empty())
            .map(|(id, entry)| {
                (
                    id.clone(),
                    CachedModel {
                        provider_type: entry.provider_type.clone(),
                        object: entry.model.object.clone(),
                        owned_by: entry.model.owned_by.clone(),
                        created: entry.model.created,
                    },
                )
            })
            .collect();

        cache.set(&ModelCacheDoc::new(models)).await
    }

    /// Non-blocking startup: load from cache synchronously so cached models
    /// serve immediately, then run the network build in the background.
    pub async fn initialize_async(self: Arc<Self>) {
        match self.load_from_cache().await {
            Ok(loaded) if loaded > 0 => {
                info!(models = loaded, "model registry warmed from cache")
            }
            Ok(_) => debug!("no cached models available at startup"),
            Err(e) => warn!(error = %e, "failed to load model cache"),
        }

        let registry = self.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.initialize().await {
                warn!(error = %e, "background registry initialization failed");
            } else {
                info!(
                    models = registry.model_count(),
                    "model registry initialized"
                );
            }
        });
    }

    /// Schedule [`refresh`](Self::refresh) at a fixed interval. The task
    /// stops when the handle is cancelled or dropped.
    pub fn start_background_refresh(self: Arc<Self>, interval: Duration) -> RefreshHandle {
        let (stop, mut stopped) = watch::channel(false);
        let registry = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; consume it so refreshes
            // start one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = registry.refresh().await {
                            warn!(error = %e, "background model refresh failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("background model refresh stopped");
        });

        RefreshHandle { stop }
    }
}
