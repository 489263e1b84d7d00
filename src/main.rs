//! Gateway server entry point

use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gomodel_rs::cache::{LocalCache, ModelCache, RedisCache, RedisCacheConfig};
use gomodel_rs::config::{self, Config};
use gomodel_rs::observability::Metrics;
use gomodel_rs::providers::{self, ModelRegistry, Router};
use gomodel_rs::server::{resolve_metrics_path, run_server, AppState, ServerSettings};

/// Refresh the model registry every five minutes so the list tracks
/// provider-side additions and removals.
const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Pick the cache backend from configuration: local file by default, Redis
/// when configured.
async fn init_cache(config: &Config) -> gomodel_rs::Result<Arc<dyn ModelCache>> {
    match config.cache.cache_type.as_str() {
        "redis" => {
            let redis_config = RedisCacheConfig {
                url: config.cache.redis.url.clone(),
                key: config.cache.redis.key.clone(),
                ttl: Duration::from_secs(config.cache.redis.ttl.max(1)),
            };
            info!(url = %redis_config.url, key = %redis_config.key, "using redis cache");
            Ok(Arc::new(RedisCache::connect(redis_config).await?))
        }
        _ => {
            let path = config::cache_dir().join("models.json");
            info!(path = %path.display(), "using local file cache");
            Ok(Arc::new(LocalCache::new(path)))
        }
    }
}

#[actix_web::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            process::exit(1);
        }
    };

    if config.providers.is_empty() {
        error!("at least one provider must be configured");
        process::exit(1);
    }

    let model_cache = match init_cache(&config).await {
        Ok(cache) => cache,
        Err(e) => {
            error!(error = %e, "failed to initialize cache");
            process::exit(1);
        }
    };

    let metrics = if config.metrics.enabled {
        match Metrics::new() {
            Ok(metrics) => Some(Arc::new(metrics)),
            Err(e) => {
                error!(error = %e, "failed to initialize metrics");
                process::exit(1);
            }
        }
    } else {
        None
    };
    let hooks = metrics.clone().map(Metrics::hooks).unwrap_or_default();

    let registry = Arc::new(ModelRegistry::new());
    registry.set_cache(model_cache.clone());

    // BTreeMap iteration is sorted by entry name, which makes registration
    // order (and duplicate-model precedence) deterministic across runs.
    let mut initialized = 0usize;
    for (name, provider_config) in &config.providers {
        let provider = match providers::create(
            &provider_config.provider_type,
            &provider_config.api_key,
            Some(provider_config.base_url.as_str()),
            hooks.clone(),
        ) {
            Ok(provider) => provider,
            Err(e) => {
                error!(name = %name, provider_type = %provider_config.provider_type, error = %e,
                    "failed to initialize provider");
                continue;
            }
        };
        registry.register_provider_with_type(provider, &provider_config.provider_type);
        initialized += 1;
        info!(name = %name, provider_type = %provider_config.provider_type, "provider initialized");
    }

    if initialized == 0 {
        error!("no providers were successfully initialized");
        process::exit(1);
    }

    // Non-blocking startup: serve cached models immediately, fetch fresh
    // lists in the background.
    info!("starting non-blocking model registry initialization");
    registry.clone().initialize_async().await;
    info!(
        cached_models = registry.model_count(),
        providers = registry.provider_count(),
        "model registry configured"
    );

    let refresh_handle = registry.clone().start_background_refresh(REFRESH_INTERVAL);

    let router = Arc::new(Router::new(registry));

    if config.server.master_key.is_empty() {
        warn!(
            security_risk = "unauthenticated access allowed",
            recommendation = "set GOMODEL_MASTER_KEY to secure this gateway",
            "SECURITY WARNING: no master key configured - server running in UNSAFE MODE"
        );
    } else {
        info!(mode = "master_key", "authentication enabled");
    }

    let settings = ServerSettings {
        master_key: config.server.master_key.clone(),
        metrics_endpoint: config
            .metrics
            .enabled
            .then(|| resolve_metrics_path(&config.metrics.endpoint)),
        body_limit: config.body_size_limit_bytes() as usize,
    };
    let state = AppState {
        router,
        metrics,
    };

    let addr = format!("0.0.0.0:{}", config.server.port);
    let result = run_server(&addr, state, settings).await;

    refresh_handle.cancel();
    model_cache.close().await;

    if let Err(e) = result {
        error!(error = %e, "server error");
        process::exit(1);
    }
}
