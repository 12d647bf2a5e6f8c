//! Backend transport abstraction.
//!
//! The orchestrator only needs two capabilities from a text-generation
//! backend: send a chat payload and get the reply text back, and answer
//! a health probe. Everything else (streaming, tool calls, retries at
//! the HTTP layer) is deliberately out of scope; retry policy lives in
//! the executor where it can be logged against the job.

mod http;

pub use http::HttpBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BackendError, BackendResult};

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System-turn text.
    pub system: String,
    /// User-turn text.
    pub user: String,
    /// Model override; the backend default applies when `None`.
    pub model: Option<String>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Response length cap in tokens.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Narrow transport interface every backend implements.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send one request and return the reply text.
    async fn send(&self, request: ChatRequest) -> BackendResult<String>;

    /// Whether the backend is currently reachable.
    async fn health_check(&self) -> bool;
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Backend").finish()
    }
}

/// Shared reference to a backend.
pub type SharedBackend = Arc<dyn Backend>;

/// Construct the backend for a backend identifier.
///
/// `bridge` talks to a local proxy without credentials; `openrouter`
/// talks to the hosted API using `OPENROUTER_API_KEY`. Unknown
/// identifiers are a configuration error, not a transport error.
pub fn backend_for(id: &str) -> BackendResult<SharedBackend> {
    match id {
        "bridge" => Ok(Arc::new(HttpBackend::local_proxy())),
        "openrouter" => {
            let key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
                BackendError::invalid_config("OPENROUTER_API_KEY is not set")
            })?;
            Ok(Arc::new(HttpBackend::hosted(key)))
        }
        other => Err(BackendError::invalid_config(format!(
            "unknown backend: {}",
            other
        ))),
    }
}
