//! Application context shared by editor sessions, chat engines and pipelines.
//!
//! Holds the collaborator handles, the client event bus, configuration and
//! the per-(user, context) chat id cache. Cloning is cheap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::ClientConfig;
use crate::events::EventBus;
use crate::models::{ChatId, ContextId, UserId};
use crate::traits::{AssetUploader, AssistantBackend, ChatGateway, DocumentGateway};

/// Shared handles passed into every component constructor.
#[derive(Clone)]
pub struct AppContext {
    pub documents: Arc<dyn DocumentGateway>,
    pub chats: Arc<dyn ChatGateway>,
    pub assistant: Arc<dyn AssistantBackend>,
    pub assets: Arc<dyn AssetUploader>,
    pub events: Arc<EventBus>,
    pub config: ClientConfig,
    chat_ids: Arc<Mutex<HashMap<(UserId, ContextId), ChatId>>>,
}

impl AppContext {
    pub fn new(
        documents: Arc<dyn DocumentGateway>,
        chats: Arc<dyn ChatGateway>,
        assistant: Arc<dyn AssistantBackend>,
        assets: Arc<dyn AssetUploader>,
        config: ClientConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.event_bus_capacity));
        Self {
            documents,
            chats,
            assistant,
            assets,
            events,
            config,
            chat_ids: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the event bus (e.g. to share one bus between contexts).
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Chat id previously initialised for this (user, context) pair.
    pub fn cached_chat_id(&self, user: &UserId, context: &ContextId) -> Option<ChatId> {
        self.chat_ids
            .lock()
            .ok()
            .and_then(|ids| ids.get(&(user.clone(), context.clone())).cloned())
    }

    /// Remember the chat id for this (user, context) pair.
    pub fn remember_chat_id(&self, user: &UserId, context: &ContextId, chat: ChatId) {
        if let Ok(mut ids) = self.chat_ids.lock() {
            ids.insert((user.clone(), context.clone()), chat);
        }
    }

    /// Forget all cached chat ids (e.g. on sign-out).
    pub fn clear_chat_ids(&self) {
        if let Ok(mut ids) = self.chat_ids.lock() {
            ids.clear();
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("assistant", &self.assistant.backend_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
