//! Centralized default constants for margin.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the CLI should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// AUTOSAVE
// =============================================================================

/// Debounce window after the last edit before a save fires (milliseconds).
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 500;

/// Capacity of an editor session's command queue.
pub const EDITOR_QUEUE_CAPACITY: usize = 256;

/// Save duration above which a slow-operation warning is logged (milliseconds).
pub const SLOW_SAVE_MS: u64 = 5_000;

// =============================================================================
// UPLOADS
// =============================================================================

/// Maximum accepted image size in bytes (10 MiB).
pub const UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default image host upload endpoint.
pub const IMAGE_HOST_URL: &str = "https://api.imgbb.com/1/upload";

// =============================================================================
// NETWORK
// =============================================================================

/// Default base URL of the notes REST API.
pub const API_URL: &str = "http://localhost:8000";

/// Default HTTP request timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// ASSISTANT
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default assistant generation model.
pub const ASSISTANT_MODEL: &str = "llama3.2:3b";

/// Assistant query timeout in seconds. Queries are latency-bound; this only
/// stops a hung connection.
pub const ASSISTANT_TIMEOUT_SECS: u64 = 120;

/// Assistant query duration above which a slow-operation warning is logged.
pub const SLOW_ASSISTANT_MS: u64 = 30_000;

// =============================================================================
// EVENTS
// =============================================================================

/// Client event bus buffer size.
pub const EVENT_BUS_CAPACITY: usize = 256;
