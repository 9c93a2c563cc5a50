//! # margin-inference
//!
//! Assistant backends for margin chat.
//!
//! This crate provides:
//! - [`ContextSource`]: per-context reference text for grounding answers
//! - Ollama chat-API backend (default)
//! - Deterministic mock backend (feature `mock`)
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Enable mock backend for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use margin_core::{AssistantBackend, ContextId};
//! use margin_inference::OllamaAssistant;
//!
//! #[tokio::main]
//! async fn main() {
//!     let assistant = OllamaAssistant::from_env();
//!     let answer = assistant
//!         .query_assistant(&ContextId::from("lecture-1"), "What is ATP?")
//!         .await
//!         .unwrap();
//!     println!("{}", answer);
//! }
//! ```

pub mod context;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use context::{format_prompt, ContextSource, NoContext, StaticContext};

#[cfg(feature = "ollama")]
pub use ollama::OllamaAssistant;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockAssistant, MockCall};
