//! Reference context for assistant prompts.

use std::collections::HashMap;

use async_trait::async_trait;

use margin_core::{ContextId, Result};

/// Supplies reference text (e.g. a lecture transcript) for a context id.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Text the answer to `question` should be grounded in. Empty when the
    /// context has nothing relevant.
    async fn context_for(&self, context: &ContextId, question: &str) -> Result<String>;
}

/// Answers without reference text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn context_for(&self, _context: &ContextId, _question: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Fixed reference text per context id, with an optional fallback for
/// unknown ids.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    texts: HashMap<ContextId, String>,
    fallback: Option<String>,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, context: impl Into<ContextId>, text: impl Into<String>) -> Self {
        self.texts.insert(context.into(), text.into());
        self
    }

    /// Text used for every context without its own entry.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }
}

#[async_trait]
impl ContextSource for StaticContext {
    async fn context_for(&self, context: &ContextId, _question: &str) -> Result<String> {
        Ok(self
            .texts
            .get(context)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_default())
    }
}

/// Build the question/context prompt sent to the model.
pub fn format_prompt(question: &str, context: &str) -> String {
    if context.trim().is_empty() {
        format!("Question: {}", question)
    } else {
        format!("Question: {}\n\nContext: {}", question, context)
    }
}
