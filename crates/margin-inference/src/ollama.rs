//! Ollama assistant backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use margin_core::defaults::{ASSISTANT_MODEL, ASSISTANT_TIMEOUT_SECS, OLLAMA_URL, SLOW_ASSISTANT_MS};
use margin_core::{AssistantBackend, ContextId, Error, Result};

use crate::context::{format_prompt, ContextSource, NoContext};

/// System prompt keeping answers close to the reference text.
const SYSTEM_PROMPT: &str = "You answer questions about a lecture. Stay as close as possible to \
the provided context and keep answers short. If the context does not contain the answer, say \
\"Information not available.\"";

/// Assistant backed by an Ollama server's chat API.
pub struct OllamaAssistant {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
    context_source: Arc<dyn ContextSource>,
}

impl OllamaAssistant {
    /// Create a backend with default settings.
    pub fn new() -> Self {
        Self::with_config(OLLAMA_URL, ASSISTANT_MODEL, ASSISTANT_TIMEOUT_SECS)
    }

    pub fn with_config(base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();

        info!("Initializing Ollama assistant: url={}, model={}", base_url, model);

        Self {
            client,
            base_url,
            model,
            timeout_secs,
            context_source: Arc::new(NoContext),
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OLLAMA_BASE` | `http://localhost:11434` | Ollama server URL |
    /// | `MARGIN_ASSISTANT_MODEL` | `llama3.2:3b` | Chat model |
    /// | `MARGIN_ASSISTANT_TIMEOUT_SECS` | `120` | Request timeout |
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE").unwrap_or_else(|_| OLLAMA_URL.to_string());
        let model = std::env::var("MARGIN_ASSISTANT_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| ASSISTANT_MODEL.to_string());
        let timeout_secs = std::env::var("MARGIN_ASSISTANT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(ASSISTANT_TIMEOUT_SECS);

        Self::with_config(base_url, model, timeout_secs)
    }

    /// Ground answers in text from `source`.
    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.context_source = source;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for OllamaAssistant {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat API message for `/api/chat`.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl AssistantBackend for OllamaAssistant {
    #[instrument(skip(self, query), fields(subsystem = "assistant", op = "query", context_id = %context, model = %self.model))]
    async fn query_assistant(&self, context: &ContextId, query: &str) -> Result<String> {
        let start = Instant::now();

        let reference = self
            .context_source
            .context_for(context, query)
            .await
            .map_err(|e| Error::Assistant(format!("Context lookup failed: {}", e)))?;
        debug!(context_len = reference.len(), "Starting query via chat API");

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format_prompt(query, &reference),
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Assistant(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Assistant(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Assistant(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content.trim().to_string();
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Query complete"
        );
        if elapsed > SLOW_ASSISTANT_MS {
            warn!(
                duration_ms = elapsed,
                query_len = query.len(),
                slow = true,
                "Slow assistant query"
            );
        }
        if content.is_empty() {
            return Err(Error::Assistant("Ollama returned an empty answer".into()));
        }
        Ok(content)
    }

    fn backend_name(&self) -> &'static str {
        "ollama"
    }
}
