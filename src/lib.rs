//! # gomodel-rs
//!
//! A multi-provider LLM gateway with an OpenAI-compatible surface: chat
//! completions, the Responses API, and model listing over a single
//! endpoint, routed by model id to OpenAI, Anthropic, Gemini, Groq, or xAI.
//!
//! The request plane is built from four pieces:
//!
//! - a resilient upstream client with retries, backoff+jitter, and a
//!   circuit breaker per provider ([`llmclient`])
//! - provider adapters translating canonical envelopes to native wire
//!   formats ([`providers`])
//! - a model registry resolving model ids to providers via immutable
//!   snapshots, warmed from a pluggable cache ([`providers::registry`],
//!   [`cache`])
//! - byte-level SSE translators bridging provider streaming dialects
//!   ([`providers::streaming`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gomodel_rs::providers::{self, ModelRegistry, Router};
//! use gomodel_rs::llmclient::Hooks;
//!
//! # async fn run() -> gomodel_rs::Result<()> {
//! let registry = Arc::new(ModelRegistry::new());
//! let provider = providers::create("openai", "sk-...", None, Hooks::default())?;
//! registry.register_provider_with_type(provider, "openai");
//! registry.initialize().await?;
//!
//! let router = Router::new(registry);
//! assert!(router.supports("gpt-4o"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod llmclient;
pub mod observability;
pub mod providers;
pub mod server;

pub use config::Config;
pub use core::{GatewayError, Result};
pub use providers::{ModelRegistry, Provider, Router};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
