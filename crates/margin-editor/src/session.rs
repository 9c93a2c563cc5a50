//! Editor sessions.
//!
//! A mounted editor is one actor task owning the document tree and its
//! [`AutosaveCoordinator`]. Edits, flushes, save completions and the
//! debounce timer are all serialised through the actor's command queue, so
//! coordinator transitions never run concurrently. Saves run in spawned
//! tasks and post their result back into the queue; once the session is
//! unmounted those late results have nowhere to go and are dropped.

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, trace, warn};

use margin_core::defaults::{EDITOR_QUEUE_CAPACITY, SLOW_SAVE_MS};
use margin_core::{Ack, AppContext, ClientEvent, DocumentId, Error, Result, UserId};

use crate::autosave::{Action, AutosaveCoordinator, SaveStatus};
use crate::content::{
    load, serialize, Block, Document, EditorVariant, Format, LoadOutcome, Position, Range, Tree,
};

/// Result of a [`EditorHandle::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The store acknowledged the latest content.
    Saved { revision: u64 },
    /// Nothing changed since the last save.
    Unchanged,
    /// The save failed; the editor buffer is untouched.
    Failed { error: String },
}

enum EditOp {
    InsertText { at: Position, text: String },
    DeleteRange(Range),
    SplitBlock(Position),
    Apply { range: Range, format: Format },
    InsertNode {
        at: Position,
        block: Block,
        clamp: bool,
    },
    Replace(Tree),
}

enum Command {
    Edit {
        op: EditOp,
        reply: oneshot::Sender<Result<Position>>,
    },
    Snapshot {
        reply: oneshot::Sender<Document>,
    },
    Status {
        reply: oneshot::Sender<SaveStatus>,
    },
    Flush {
        reply: oneshot::Sender<SaveOutcome>,
    },
    SaveFinished {
        bytes: usize,
        started: Instant,
        result: Result<Ack>,
    },
    Unmount {
        reply: oneshot::Sender<()>,
    },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable handle to a mounted editor session.
///
/// Edit methods return as soon as the edit is applied; they never wait for
/// a save.
#[derive(Clone)]
pub struct EditorHandle {
    tx: mpsc::Sender<Command>,
    document_id: DocumentId,
    user_id: UserId,
    variant: EditorVariant,
}

impl std::fmt::Debug for EditorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorHandle")
            .field("document_id", &self.document_id)
            .field("user_id", &self.user_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

fn closed() -> Error {
    Error::Closed("editor session unmounted".into())
}

impl EditorHandle {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn variant(&self) -> EditorVariant {
        self.variant
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    async fn edit(&self, op: EditOp) -> Result<Position> {
        self.request(|reply| Command::Edit { op, reply }).await?
    }

    /// Type `text` at `at`; newlines split blocks. Returns the new cursor.
    pub async fn insert_text(&self, at: Position, text: impl Into<String>) -> Result<Position> {
        self.edit(EditOp::InsertText {
            at,
            text: text.into(),
        })
        .await
    }

    pub async fn delete_range(&self, range: Range) -> Result<Position> {
        self.edit(EditOp::DeleteRange(range)).await
    }

    pub async fn split_block(&self, at: Position) -> Result<Position> {
        self.edit(EditOp::SplitBlock(at)).await
    }

    /// Apply a toolbar format. Returns the range end.
    pub async fn apply(&self, range: Range, format: Format) -> Result<Position> {
        self.edit(EditOp::Apply { range, format }).await
    }

    /// Insert a block at `at`. Returns the inserted block's position.
    pub async fn insert_node(&self, at: Position, block: Block) -> Result<Position> {
        self.edit(EditOp::InsertNode {
            at,
            block,
            clamp: false,
        })
        .await
    }

    /// Like [`insert_node`](Self::insert_node), but a position made stale by
    /// later edits is pulled back to the nearest valid one.
    pub async fn insert_node_near(&self, at: Position, block: Block) -> Result<Position> {
        self.edit(EditOp::InsertNode {
            at,
            block,
            clamp: true,
        })
        .await
    }

    /// Replace the whole body. Returns the end of the new content.
    pub async fn replace(&self, tree: Tree) -> Result<Position> {
        self.edit(EditOp::Replace(tree)).await
    }

    pub async fn snapshot(&self) -> Result<Document> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn plain_text(&self) -> Result<String> {
        Ok(self.snapshot().await?.content.plain_text())
    }

    pub async fn status(&self) -> Result<SaveStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Save now and wait for the outcome, including any follow-up save
    /// queued behind an in-flight one.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Tear the session down. A pending debounce timer is cancelled and
    /// unsaved edits are not flushed. Idempotent.
    pub async fn unmount(&self) -> Result<()> {
        match self.request(|reply| Command::Unmount { reply }).await {
            Ok(()) | Err(Error::Closed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// SESSION ACTOR
// =============================================================================

/// State owned by the session actor.
pub struct EditorSession {
    ctx: AppContext,
    document: Document,
    variant: EditorVariant,
    coordinator: AutosaveCoordinator,
    timer: Option<Instant>,
    flush_waiters: Vec<oneshot::Sender<SaveOutcome>>,
    last_outcome: SaveOutcome,
    tx: mpsc::WeakSender<Command>,
}

impl EditorSession {
    /// Hydrate `document_id` and start its session.
    ///
    /// Load failures (`NotFound`, `Network`) are blocking: no session is
    /// started and a `LoadFailed` notice is emitted. Malformed content is
    /// shown as plain text with a `ContentDegraded` notice.
    #[instrument(skip_all, fields(subsystem = "editor", document_id = %document_id, user_id = %user_id))]
    pub async fn mount(
        ctx: &AppContext,
        document_id: DocumentId,
        user_id: UserId,
        variant: EditorVariant,
    ) -> Result<EditorHandle> {
        let stored = match ctx.documents.get_document(&document_id, &user_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Document load failed");
                ctx.events.emit(ClientEvent::LoadFailed {
                    document_id: document_id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let LoadOutcome { mut tree, degraded } = load(&stored);
        if let Some(reason) = &degraded {
            warn!(error = %reason, bytes = stored.len(), "Stored content malformed, showing plain text");
            ctx.events.emit(ClientEvent::ContentDegraded {
                document_id: document_id.clone(),
                error: reason.clone(),
            });
        }
        tree.normalize_variant(variant);

        let coordinator = AutosaveCoordinator::new(ctx.config.autosave_debounce(), serialize(&tree));
        let (tx, rx) = mpsc::channel(EDITOR_QUEUE_CAPACITY);

        let session = EditorSession {
            ctx: ctx.clone(),
            document: Document {
                id: document_id.clone(),
                owner: user_id.clone(),
                content: tree,
                revision: 0,
            },
            variant,
            coordinator,
            timer: None,
            flush_waiters: Vec::new(),
            last_outcome: SaveOutcome::Unchanged,
            tx: tx.downgrade(),
        };

        ctx.events.emit(ClientEvent::DocumentLoaded {
            document_id: document_id.clone(),
            degraded: degraded.is_some(),
        });
        info!(bytes = stored.len(), degraded = degraded.is_some(), "Editor session mounted");

        tokio::spawn(session.run(rx));

        Ok(EditorHandle {
            tx,
            document_id,
            user_id,
            variant,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.timer;
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Unmount { reply }) => {
                        rx.close();
                        self.timer = None;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.timer = None;
                    let action = self
                        .coordinator
                        .on_deadline(Instant::now(), || serialize(&self.document.content));
                    self.perform(action);
                }
            }
        }

        if self.coordinator.is_busy() {
            debug!(document_id = %self.document.id, "Session closed with unsaved or in-flight changes");
        }
        info!(subsystem = "editor", document_id = %self.document.id, "Editor session unmounted");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Edit { op, reply } => {
                let result = self.apply_edit(op);
                if result.is_ok() {
                    let action = self.coordinator.on_edit(Instant::now());
                    self.perform(action);
                }
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.document.clone());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.coordinator.status());
            }
            Command::Flush { reply } => {
                let action = self
                    .coordinator
                    .flush(|| serialize(&self.document.content));
                let saving = matches!(action, Action::Save(_));
                self.perform(action);
                if saving || self.coordinator.is_busy() {
                    self.flush_waiters.push(reply);
                } else {
                    let _ = reply.send(SaveOutcome::Unchanged);
                }
            }
            Command::SaveFinished {
                bytes,
                started,
                result,
            } => self.on_save_finished(bytes, started, result),
            // Handled by the run loop.
            Command::Unmount { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn apply_edit(&mut self, op: EditOp) -> Result<Position> {
        let tree = &mut self.document.content;
        let cursor = match op {
            EditOp::InsertText { at, text } => {
                trace!(block = at.block, offset = at.offset, chars = text.chars().count(), "insert_text");
                tree.insert_text(at, &text)?
            }
            EditOp::DeleteRange(range) => tree.delete_range(range)?,
            EditOp::SplitBlock(at) => tree.split_block(at)?,
            EditOp::Apply { range, format } => {
                trace!(?format, "apply");
                let title_kind = (self.variant == EditorVariant::Titled)
                    .then(|| tree.blocks()[0].kind.clone());
                tree.apply(range, &format)?;
                // The title keeps its heading kind.
                if let Some(kind) = title_kind {
                    tree.blocks_mut()[0].kind = kind;
                }
                range.end
            }
            EditOp::InsertNode { at, block, clamp } => {
                let mut at = if clamp { tree.clamp(at) } else { at };
                if self.variant == EditorVariant::Titled && at.block == 0 {
                    tree.check_position(at)?;
                    at = Position::new(0, tree.blocks()[0].len());
                }
                tree.insert_node(at, block)?
            }
            EditOp::Replace(new_tree) => {
                *tree = new_tree;
                tree.normalize();
                tree.end()
            }
        };
        tree.normalize_variant(self.variant);
        Ok(cursor)
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Schedule(deadline) => {
                trace!(document_id = %self.document.id, "Autosave debounce armed");
                self.timer = Some(deadline);
            }
            Action::Save(serialization) => {
                self.timer = None;
                self.spawn_save(serialization);
            }
        }
    }

    fn spawn_save(&self, serialization: String) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let documents = self.ctx.documents.clone();
        let document_id = self.document.id.clone();
        let user_id = self.document.owner.clone();
        debug!(document_id = %document_id, bytes = serialization.len(), "Autosave starting");

        tokio::spawn(async move {
            let started = Instant::now();
            let result = documents
                .save_document(&document_id, &user_id, &serialization)
                .await;
            // The session may be gone; the result is dropped then.
            let _ = tx
                .send(Command::SaveFinished {
                    bytes: serialization.len(),
                    started,
                    result,
                })
                .await;
        });
    }

    fn on_save_finished(&mut self, bytes: usize, started: Instant, result: Result<Ack>) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let slow = duration_ms > SLOW_SAVE_MS;
        let document_id = self.document.id.clone();

        let ok = match result {
            Ok(ack) => {
                self.document.revision = ack.revision.unwrap_or(self.document.revision + 1);
                if slow {
                    warn!(document_id = %document_id, duration_ms, slow, "Slow save");
                }
                info!(
                    subsystem = "autosave",
                    document_id = %document_id,
                    bytes,
                    revision = self.document.revision,
                    duration_ms,
                    "Document saved"
                );
                self.ctx.events.emit(ClientEvent::DocumentSaved {
                    document_id,
                    bytes,
                    revision: ack.revision,
                });
                self.last_outcome = SaveOutcome::Saved {
                    revision: self.document.revision,
                };
                true
            }
            Err(e) => {
                warn!(
                    subsystem = "autosave",
                    document_id = %document_id,
                    error = %e,
                    kind = e.kind(),
                    duration_ms,
                    "Save failed, keeping local edits"
                );
                self.ctx.events.emit(ClientEvent::SaveFailed {
                    document_id,
                    error: e.to_string(),
                });
                self.last_outcome = SaveOutcome::Failed {
                    error: e.to_string(),
                };
                false
            }
        };

        let action = self
            .coordinator
            .on_save_complete(ok, || serialize(&self.document.content));
        let follow_up = matches!(action, Action::Save(_));
        if follow_up {
            debug!(document_id = %self.document.id, "Edits landed mid-save, saving again");
        }
        self.perform(action);

        if !follow_up {
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(self.last_outcome.clone());
            }
        }
    }
}
