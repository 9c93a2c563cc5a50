//! Client configuration.

use std::time::Duration;

use crate::defaults;

/// Configuration shared by editor sessions, chat engines and gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the notes REST API.
    pub api_url: String,
    /// Autosave debounce window in milliseconds.
    pub autosave_debounce_ms: u64,
    /// Maximum accepted upload size in bytes.
    pub upload_max_bytes: u64,
    /// Client event bus buffer size.
    pub event_bus_capacity: usize,
    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            autosave_debounce_ms: defaults::AUTOSAVE_DEBOUNCE_MS,
            upload_max_bytes: defaults::UPLOAD_MAX_BYTES,
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MARGIN_API_URL` | `http://localhost:8000` | Notes REST API base URL |
    /// | `MARGIN_AUTOSAVE_DEBOUNCE_MS` | `500` | Debounce window after the last edit |
    /// | `MARGIN_UPLOAD_MAX_BYTES` | `10485760` | Largest image accepted for upload |
    /// | `MARGIN_EVENT_BUS_CAPACITY` | `256` | Client event buffer |
    /// | `MARGIN_HTTP_TIMEOUT_SECS` | `30` | HTTP request timeout |
    pub fn from_env() -> Self {
        let api_url = std::env::var("MARGIN_API_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::API_URL.to_string());

        let autosave_debounce_ms = std::env::var("MARGIN_AUTOSAVE_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::AUTOSAVE_DEBOUNCE_MS);

        let upload_max_bytes = std::env::var("MARGIN_UPLOAD_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::UPLOAD_MAX_BYTES);

        let event_bus_capacity = std::env::var("MARGIN_EVENT_BUS_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::EVENT_BUS_CAPACITY)
            .max(1);

        let http_timeout_secs = std::env::var("MARGIN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::HTTP_TIMEOUT_SECS);

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            autosave_debounce_ms,
            upload_max_bytes,
            event_bus_capacity,
            http_timeout_secs,
        }
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the autosave debounce window.
    pub fn with_autosave_debounce_ms(mut self, ms: u64) -> Self {
        self.autosave_debounce_ms = ms;
        self
    }

    /// Set the upload size limit.
    pub fn with_upload_max_bytes(mut self, bytes: u64) -> Self {
        self.upload_max_bytes = bytes;
        self
    }

    /// Set the event bus buffer size.
    pub fn with_event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity.max(1);
        self
    }

    /// Autosave debounce window as a `Duration`.
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// HTTP timeout as a `Duration`.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
