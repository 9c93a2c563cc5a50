//! # margin-chat
//!
//! The assistant chat surface for margin: chat sessions with optimistic
//! sends, conversion of assistant replies to rich content, and capture of
//! selected replies into documents.

pub mod capture;
pub mod chat_markup;
pub mod engine;

pub use capture::CapturePipeline;
pub use chat_markup::{to_rich_markup, to_tree};
pub use engine::{ChatEngine, ChatState, SendFailure, SendReport};
