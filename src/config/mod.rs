//! Configuration loading
//!
//! Configuration comes from a YAML file (`./config/config.yaml` or
//! `./config.yaml`) with `${VAR}` / `${VAR:-default}` expansion, or from
//! environment variables alone when no file is present. A `.env` file is
//! loaded first so both paths see the same environment.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::core::{GatewayError, Result};

/// Default request body limit (10 MiB)
pub const DEFAULT_BODY_SIZE_LIMIT: u64 = 10 * 1024 * 1024;
/// Smallest accepted body limit (1 KiB)
pub const MIN_BODY_SIZE_LIMIT: u64 = 1024;
/// Largest accepted body limit (100 MiB)
pub const MAX_BODY_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// Provider tags recognized in the environment-only fallback.
const ENV_PROVIDER_TAGS: &[&str] = &["anthropic", "gemini", "groq", "openai", "xai"];

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("static pattern")
});

static BODY_SIZE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)([KMG])?B?$").expect("static pattern"));

fn default_port() -> String {
    "8080".to_string()
}

fn default_cache_type() -> String {
    "local".to_string()
}

fn default_redis_key() -> String {
    "gomodel:models".to_string()
}

fn default_redis_ttl() -> u64 {
    86_400
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Keyed by config entry name; BTreeMap keeps iteration in sorted name
    /// order, which pins provider registration order.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: String,
    /// Empty disables authentication (unsafe mode)
    #[serde(default)]
    pub master_key: String,
    /// Max request body size, e.g. "10M", "1024K"; empty means the default
    #[serde(default)]
    pub body_size_limit: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            master_key: String::new(),
            body_size_limit: String::new(),
        }
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// "local" (default) or "redis"
    #[serde(rename = "type", default = "default_cache_type")]
    pub cache_type: String,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            redis: RedisConfig::default(),
        }
    }
}

/// Redis settings, used only when the cache type is "redis"
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_redis_key")]
    pub key: String,
    /// TTL for the cached model document, in seconds
    #[serde(default = "default_redis_ttl")]
    pub ttl: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key: default_redis_key(),
            ttl: default_redis_ttl(),
        }
    }
}

/// Prometheus metrics exposure
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_endpoint")]
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_metrics_endpoint(),
        }
    }
}

/// One backend provider entry
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Adapter type tag, e.g. "openai", "anthropic"
    #[serde(rename = "type")]
    pub provider_type: String,
    pub api_key: String,
    /// Optional endpoint override
    #[serde(default)]
    pub base_url: String,
}

impl Config {
    /// Load configuration from file and environment. A `.env` file is read
    /// first; missing config files are not an error.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::load_from(Path::new("."))
    }

    /// Load relative to a base directory (tests use a temp dir).
    pub fn load_from(base: &Path) -> Result<Self> {
        let mut config = match find_config_file(base) {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                let raw = std::fs::read_to_string(&path)?;
                let mut config: Config = serde_yaml::from_str(&raw)?;
                config.expand_env_vars();
                config.drop_unresolved_providers();
                config
            }
            None => Self::from_env(),
        };

        // METRICS_ENABLED always wins over the file value.
        if let Ok(enabled) = env::var("METRICS_ENABLED") {
            if !enabled.is_empty() {
                config.metrics.enabled = enabled.eq_ignore_ascii_case("true") || enabled == "1";
            }
        }

        if !config.server.body_size_limit.is_empty() {
            parse_body_size_limit(&config.server.body_size_limit)
                .map_err(|e| GatewayError::Config(format!("invalid BODY_SIZE_LIMIT: {e}")))?;
        }

        Ok(config)
    }

    /// Environment-only fallback when no config file exists.
    fn from_env() -> Self {
        let mut config = Config {
            server: ServerConfig {
                port: env_or("PORT", &default_port()),
                master_key: env_or("GOMODEL_MASTER_KEY", ""),
                body_size_limit: env_or("BODY_SIZE_LIMIT", ""),
            },
            cache: CacheConfig {
                cache_type: env_or("CACHE_TYPE", &default_cache_type()),
                redis: RedisConfig {
                    url: env_or("REDIS_URL", ""),
                    key: env_or("REDIS_KEY", &default_redis_key()),
                    ttl: env::var("REDIS_TTL")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_else(default_redis_ttl),
                },
            },
            metrics: MetricsConfig {
                enabled: false,
                endpoint: env_or("METRICS_ENDPOINT", &default_metrics_endpoint()),
            },
            providers: BTreeMap::new(),
        };

        for tag in ENV_PROVIDER_TAGS {
            let key_var = format!("{}_API_KEY", tag.to_uppercase());
            let Ok(api_key) = env::var(&key_var) else {
                continue;
            };
            if api_key.is_empty() {
                continue;
            }
            let base_url = env_or(&format!("{}_BASE_URL", tag.to_uppercase()), "");
            config.providers.insert(
                format!("{tag}-primary"),
                ProviderConfig {
                    provider_type: tag.to_string(),
                    api_key,
                    base_url,
                },
            );
        }

        config
    }

    fn expand_env_vars(&mut self) {
        self.server.port = expand_string(&self.server.port);
        self.server.master_key = expand_string(&self.server.master_key);
        self.server.body_size_limit = expand_string(&self.server.body_size_limit);
        self.metrics.endpoint = expand_string(&self.metrics.endpoint);
        self.cache.cache_type = expand_string(&self.cache.cache_type);
        self.cache.redis.url = expand_string(&self.cache.redis.url);
        self.cache.redis.key = expand_string(&self.cache.redis.key);

        for provider in self.providers.values_mut() {
            provider.api_key = expand_string(&provider.api_key);
            provider.base_url = expand_string(&provider.base_url);
        }
    }

    /// Drop provider entries whose API key is empty or still contains an
    /// unexpanded placeholder.
    fn drop_unresolved_providers(&mut self) {
        self.providers
            .retain(|_, p| !p.api_key.is_empty() && !p.api_key.contains("${"));
    }

    /// Effective request body limit in bytes.
    pub fn body_size_limit_bytes(&self) -> u64 {
        if self.server.body_size_limit.is_empty() {
            return DEFAULT_BODY_SIZE_LIMIT;
        }
        parse_body_size_limit(&self.server.body_size_limit).unwrap_or(DEFAULT_BODY_SIZE_LIMIT)
    }
}

/// Directory for local cache files: `$GOMODEL_CACHE_DIR` or `./.cache`.
pub fn cache_dir() -> PathBuf {
    match env::var("GOMODEL_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(".cache"),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn find_config_file(base: &Path) -> Option<PathBuf> {
    ["config/config.yaml", "config/config.yml", "config.yaml", "config.yml"]
        .into_iter()
        .map(|rel| base.join(rel))
        .find(|p| p.is_file())
}

/// Expand `${VAR}` and `${VAR:-default}` references. Unset variables without
/// a default leave the placeholder intact, which later drops the provider
/// entry.
pub fn expand_string(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let value = env::var(name).unwrap_or_default();
            if !value.is_empty() {
                value
            } else if let Some(default) = caps.get(2) {
                default.as_str().to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Parse a body-size-limit string such as "10M", "1024K", "104857600".
/// Values must land within [1 KiB, 100 MiB].
pub fn parse_body_size_limit(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_BODY_SIZE_LIMIT);
    }

    let caps = BODY_SIZE_PATTERN.captures(trimmed).ok_or_else(|| {
        GatewayError::Config(format!(
            "invalid format {trimmed:?}: expected pattern like '10M', '1024K', or '104857600'"
        ))
    })?;

    let value: u64 = caps[1]
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid number in {trimmed:?}: {e}")))?;

    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(unit) if unit == "K" => 1024,
        Some(unit) if unit == "M" => 1024 * 1024,
        Some(unit) if unit == "G" => 1024 * 1024 * 1024,
        _ => 1,
    };
    let bytes = value.checked_mul(multiplier).ok_or_else(|| {
        GatewayError::Config(format!("value {trimmed:?} overflows the size range"))
    })?;

    if bytes < MIN_BODY_SIZE_LIMIT {
        return Err(GatewayError::Config(format!(
            "value {bytes} bytes is below minimum of {MIN_BODY_SIZE_LIMIT} bytes (1KB)"
        )));
    }
    if bytes > MAX_BODY_SIZE_LIMIT {
        return Err(GatewayError::Config(format!(
            "value {bytes} bytes exceeds maximum of {MAX_BODY_SIZE_LIMIT} bytes (100MB)"
        )));
    }

    Ok(bytes)
}
