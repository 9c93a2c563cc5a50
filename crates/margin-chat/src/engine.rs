//! Chat session engine.
//!
//! ```text
//! Uninitialized ──mount──▶ Initializing ──▶ Ready ──send──▶ Sending ──▶ Ready
//!        ▲                      │
//!        └──── init failed ─────┘
//! ```
//!
//! Sends are optimistic: the user's message joins the transcript before the
//! store confirms it, and a failed step never removes an entry. Entries flip
//! to `confirmed` as their `append_message` calls succeed.

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use margin_core::{
    AppContext, ChatId, ClientEvent, ContextId, Error, EventActor, Message, Result, SendStage,
    TranscriptEntry, UserId,
};

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Uninitialized,
    Initializing,
    Ready,
    Sending,
}

/// Where a send stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub stage: SendStage,
    pub error: String,
}

/// Result of [`ChatEngine::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// The user's (optimistic) entry. Always present.
    pub user_entry: Uuid,
    /// The assistant's reply, when the query succeeded.
    pub assistant_entry: Option<Uuid>,
    pub failure: Option<SendFailure>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// One mounted chat surface for a (user, context) pair.
pub struct ChatEngine {
    ctx: AppContext,
    user_id: UserId,
    context_id: ContextId,
    chat_id: Option<ChatId>,
    state: ChatState,
    transcript: watch::Sender<Vec<TranscriptEntry>>,
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("user_id", &self.user_id)
            .field("context_id", &self.context_id)
            .field("chat_id", &self.chat_id)
            .field("state", &self.state)
            .field("entries", &self.transcript.borrow().len())
            .finish()
    }
}

impl ChatEngine {
    pub fn new(ctx: AppContext, user_id: UserId, context_id: ContextId) -> Self {
        let (transcript, _) = watch::channel(Vec::new());
        Self {
            ctx,
            user_id,
            context_id,
            chat_id: None,
            state: ChatState::Uninitialized,
            transcript,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Current transcript, in insertion order.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.borrow().clone()
    }

    pub fn entry(&self, id: Uuid) -> Option<TranscriptEntry> {
        self.transcript.borrow().iter().find(|e| e.id == id).cloned()
    }

    /// Watch the transcript; optimistic entries show up before the network
    /// calls behind them finish.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TranscriptEntry>> {
        self.transcript.subscribe()
    }

    /// Initialise the chat and load its transcript.
    ///
    /// The chat id is reused from the context when this pair was mounted
    /// before. If initialisation fails the engine stays `Uninitialized`; if
    /// only the history fetch fails it is `Ready` with an empty transcript.
    #[instrument(skip_all, fields(subsystem = "chat", user_id = %self.user_id, context_id = %self.context_id))]
    pub async fn mount(&mut self) -> Result<()> {
        if matches!(self.state, ChatState::Ready | ChatState::Sending) {
            return Ok(());
        }
        self.state = ChatState::Initializing;

        let chat_id = match self.ctx.cached_chat_id(&self.user_id, &self.context_id) {
            Some(chat_id) => {
                debug!(chat_id = %chat_id, "Reusing chat id");
                chat_id
            }
            None => match self
                .ctx
                .chats
                .initialize_chat(&self.user_id, &self.context_id)
                .await
            {
                Ok(chat_id) => {
                    self.ctx
                        .remember_chat_id(&self.user_id, &self.context_id, chat_id.clone());
                    chat_id
                }
                Err(e) => {
                    self.state = ChatState::Uninitialized;
                    warn!(error = %e, kind = e.kind(), "Chat initialisation failed");
                    self.ctx.events.emit(ClientEvent::ChatUnavailable {
                        context_id: self.context_id.clone(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            },
        };

        let history = match self
            .ctx
            .chats
            .get_chat_history(&chat_id, &self.user_id, &self.context_id)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, kind = e.kind(), "Chat history unavailable");
                self.ctx.events.emit(ClientEvent::ChatUnavailable {
                    context_id: self.context_id.clone(),
                    error: e.to_string(),
                });
                Vec::new()
            }
        };

        let message_count = history.len();
        self.transcript
            .send_replace(history.into_iter().map(TranscriptEntry::confirmed).collect());
        self.chat_id = Some(chat_id.clone());
        self.state = ChatState::Ready;

        info!(chat_id = %chat_id, message_count, "Chat ready");
        self.ctx.events.emit(ClientEvent::ChatReady {
            chat_id,
            context_id: self.context_id.clone(),
            message_count,
        });
        Ok(())
    }

    /// Send `text` and append the assistant's reply.
    ///
    /// Returns `Err` only when nothing was sent (blank text, not ready).
    /// Failures after the optimistic append are reported in the
    /// [`SendReport`] and as a `MessageFailed` notice.
    #[instrument(skip_all, fields(subsystem = "chat", chat_id = ?self.chat_id, chars = text.chars().count()))]
    pub async fn send(&mut self, text: &str) -> Result<SendReport> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("message is empty".into()));
        }
        let chat_id = match (&self.state, &self.chat_id) {
            (ChatState::Ready, Some(chat_id)) => chat_id.clone(),
            _ => {
                return Err(Error::NotReady(format!(
                    "chat for context {} is not ready",
                    self.context_id
                )))
            }
        };

        self.state = ChatState::Sending;
        let report = self.exchange(&chat_id, text).await;
        self.state = ChatState::Ready;
        Ok(report)
    }

    async fn exchange(&self, chat_id: &ChatId, text: &str) -> SendReport {
        let user_message = Message::from_user(&self.user_id, text);
        let user_entry = self.push(TranscriptEntry::pending(user_message.clone()));
        let mut report = SendReport {
            user_entry,
            assistant_entry: None,
            failure: None,
        };

        if let Err(e) = self
            .ctx
            .chats
            .append_message(chat_id, &self.user_id, &user_message)
            .await
        {
            report.failure = Some(self.fail(chat_id, SendStage::PersistUser, e));
            return report;
        }
        self.confirm(user_entry);

        let answer = match self
            .ctx
            .assistant
            .query_assistant(&self.context_id, text)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                report.failure = Some(self.fail(chat_id, SendStage::Query, e));
                return report;
            }
        };

        let reply = Message::from_assistant(answer);
        let assistant_entry = self.push(TranscriptEntry::pending(reply.clone()));
        report.assistant_entry = Some(assistant_entry);

        match self
            .ctx
            .chats
            .append_message(chat_id, &self.user_id, &reply)
            .await
        {
            Ok(_) => {
                self.confirm(assistant_entry);
                debug!(backend = self.ctx.assistant.backend_name(), "Exchange complete");
            }
            Err(e) => report.failure = Some(self.fail(chat_id, SendStage::PersistReply, e)),
        }
        report
    }

    fn push(&self, entry: TranscriptEntry) -> Uuid {
        let id = entry.id;
        self.transcript.send_modify(|entries| entries.push(entry));
        id
    }

    fn confirm(&self, id: Uuid) {
        self.transcript.send_modify(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.confirmed = true;
            }
        });
    }

    fn fail(&self, chat_id: &ChatId, stage: SendStage, error: Error) -> SendFailure {
        warn!(
            chat_id = %chat_id,
            stage = ?stage,
            error = %error,
            kind = error.kind(),
            "Send failed, keeping optimistic entries"
        );
        self.ctx.events.emit_as(
            ClientEvent::MessageFailed {
                chat_id: chat_id.clone(),
                stage,
                error: error.to_string(),
            },
            EventActor::user(self.user_id.as_str()),
        );
        SendFailure {
            stage,
            error: error.to_string(),
        }
    }
}
