use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for surfacing and retry decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientErrorCategory {
    /// Invalid input or unsupported request.
    Config,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the chat service.
    RateLimited,
    /// Local persistence failure.
    Storage,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload crossing the runtime/UI boundary.
///
/// All store-level failures are local and non-fatal: a failed operation
/// leaves prior state intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ClientError {
    /// High-level category.
    pub category: ClientErrorCategory,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl ClientError {
    /// Construct a new error.
    pub fn new(
        category: ClientErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint.
    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    /// A message could not be persisted; the local record is marked failed
    /// and left visible for manual retry.
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Network, "send_failed", message)
    }

    /// An initial load, pagination, or room-list fetch failed.
    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Network, "load_failed", message)
    }
}

/// Map HTTP status codes reported by the SDK to error categories.
pub fn classify_http_status(status: u16) -> ClientErrorCategory {
    match status {
        408 | 429 => ClientErrorCategory::RateLimited,
        400..=499 => ClientErrorCategory::Config,
        500..=599 => ClientErrorCategory::Network,
        _ => ClientErrorCategory::Internal,
    }
}
