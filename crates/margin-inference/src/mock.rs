//! Mock assistant for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use margin_core::{AssistantBackend, ContextId};
//! use margin_inference::mock::MockAssistant;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let assistant = MockAssistant::new()
//!         .with_response_mapping("What is ATP?", "**ATP** stores energy.");
//!
//!     let answer = assistant
//!         .query_assistant(&ContextId::from("v1"), "What is ATP?")
//!         .await
//!         .unwrap();
//!     assert_eq!(answer, "**ATP** stores energy.");
//!     assert_eq!(assistant.query_count(), 1);
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use margin_core::{AssistantBackend, ContextId, Error, Result};

/// Mock assistant backend for testing.
#[derive(Clone)]
pub struct MockAssistant {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    fixed_responses: HashMap<String, String>,
    default_response: Option<String>,
    latency_ms: u64,
    failure_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub context: ContextId,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fixed_responses: HashMap::new(),
            default_response: None,
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockAssistant {
    /// Create a mock that echoes queries as `"Mock answer: {query}"`.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every unmapped query with `response`.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = Some(response.into());
        self
    }

    /// Add a response mapping for a specific query.
    pub fn with_response_mapping(
        mut self,
        query: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(query.into(), answer.into());
        self
    }

    /// Set simulated latency for every query.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.log().clear()
    }

    pub fn query_count(&self) -> usize {
        self.log().len()
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantBackend for MockAssistant {
    async fn query_assistant(&self, context: &ContextId, query: &str) -> Result<String> {
        self.log().push(MockCall {
            context: context.clone(),
            input: query.to_string(),
            timestamp: std::time::Instant::now(),
        });
        self.simulate_latency().await;

        if self.should_fail() {
            return Err(Error::Assistant("Simulated failure".into()));
        }

        if let Some(answer) = self.config.fixed_responses.get(query) {
            return Ok(answer.clone());
        }
        Ok(self
            .config
            .default_response
            .clone()
            .unwrap_or_else(|| format!("Mock answer: {}", query)))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
