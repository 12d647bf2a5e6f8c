//! HTTP chat-completions backend.
//!
//! Speaks the OpenAI chat-completions shape over `reqwest`. The same
//! implementation serves both the local bridge proxy (no credentials)
//! and hosted endpoints (bearer key), configured through the
//! constructors.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{Backend, ChatRequest};
use crate::error::{BackendError, BackendResult, ErrorCode};

const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8080/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Reqwest-backed chat-completions transport.
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    default_model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

impl HttpBackend {
    /// Backend talking to the local bridge proxy.
    ///
    /// `BRIDGE_URL` overrides the endpoint.
    pub fn local_proxy() -> Self {
        let url =
            std::env::var("BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BRIDGE_URL.to_string());
        Self::with_url(url, None)
    }

    /// Backend talking to the hosted OpenRouter API.
    pub fn hosted(api_key: String) -> Self {
        Self::with_url(OPENROUTER_URL.to_string(), Some(api_key))
    }

    /// Backend for an arbitrary endpoint; used by tests and custom setups.
    pub fn with_url(url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            url,
            api_key,
            default_model: std::env::var("LONGHAND_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
        }
    }

    fn payload(&self, request: &ChatRequest) -> serde_json::Value {
        let mut payload = json!({
            "model": request.model.as_deref().unwrap_or(&self.default_model),
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        if let Some(t) = request.temperature {
            payload["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            payload["max_tokens"] = json!(m);
        }
        payload
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: ChatRequest) -> BackendResult<String> {
        let payload = self.payload(&request);
        let mut builder = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(BackendError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = ErrorCode::from_status(status.as_u16());
            warn!(status = status.as_u16(), %code, "Backend returned error status");
            return Err(BackendError::new(
                code,
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            BackendError::new(ErrorCode::ApiError, format!("malformed response: {}", e))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                BackendError::new(ErrorCode::ApiError, "response contained no choices")
            })?;

        debug!(bytes = content.len(), "Backend reply received");
        Ok(content)
    }

    async fn health_check(&self) -> bool {
        // A cheap probe against the endpoint host; any HTTP response
        // counts as reachable.
        let probe = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        probe.is_ok()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
