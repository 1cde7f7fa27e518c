//! Core Error Taxonomy
//!
//! Every failure the orchestration core can surface to a caller. The
//! taxonomy is deliberately small: request-shape problems, authorization
//! problems, sequencing contention, and upstream provider failures.
//!
//! # Propagation Rules
//!
//! - [`CoreError::Validation`], [`CoreError::Forbidden`], and
//!   [`CoreError::NotFound`] are surfaced immediately, never retried.
//! - [`CoreError::Provider`] and [`CoreError::ProviderTimeout`] may trigger
//!   at most one retry, and only before any stream output has been
//!   delivered downstream.
//! - [`CoreError::Busy`] is surfaced with no side effects: no message rows
//!   are created for a request that never acquired the conversation slot.
//! - [`CoreError::StreamAborted`] always corresponds to a message row
//!   finalized as aborted; an orphaned in-progress row is a bug.

use thiserror::Error;

use crate::conversation::ConversationId;

/// Convenience alias for results produced by this crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the conversation orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request shape is malformed (empty message, oversized payload).
    ///
    /// A malformed *directive* is not a validation error; directive parsing
    /// is total and degrades to plain chat.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The conversation exists but is not owned by the requester.
    #[error("conversation {0} does not belong to the requester")]
    Forbidden(ConversationId),

    /// No conversation (or message) with the given id exists.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// Another generation already holds the conversation's slot and the
    /// configured wait bound elapsed.
    #[error("conversation {0} already has a generation in flight")]
    Busy(ConversationId),

    /// The upstream AI provider returned an error.
    #[error("provider request failed: {0}")]
    Provider(String),

    /// The upstream AI provider did not respond within the bounded interval.
    #[error("provider did not respond within {timeout_ms} ms")]
    ProviderTimeout {
        /// The bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A streaming generation was cancelled or failed mid-delivery.
    #[error("stream aborted: {0}")]
    StreamAborted(String),
}

impl CoreError {
    /// Whether a retry (before first byte) is permitted for this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::ProviderTimeout { .. })
    }
}
