//! # margin-core
//!
//! Core types, traits, and abstractions for margin.
//!
//! This crate provides the foundational data structures, collaborator
//! contracts and the client event bus that other margin crates depend on.
//!
//! ## Logging
//!
//! Every crate logs through `tracing` with a shared field vocabulary:
//! `subsystem` ("editor", "autosave", "image", "chat", "capture",
//! "gateway", "assistant"), `op`, `document_id`, `user_id`, `chat_id`,
//! `context_id`, `duration_ms`, `bytes`, `revision`, `message_count`,
//! `error` and `slow`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded behaviour, local state at risk |
//! | WARN  | Failure surfaced to the user as a notice, fallback applied |
//! | INFO  | Lifecycle events (session mounted/unmounted, chat ready, save done) |
//! | DEBUG | State-machine transitions, decisions, skipped saves |
//! | TRACE | Per-edit detail |

pub mod config;
pub mod context;
pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::{Error, Result};
pub use events::{ClientEvent, EventActor, EventBus, EventEnvelope, NoticeLevel, SendStage};
pub use file_safety::{detect_content_type, upload_filename, validate_image, ValidationResult};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
