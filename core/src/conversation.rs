//! Conversation Data Model
//!
//! Conversations, messages, and their identifiers. A conversation is owned
//! by exactly one user and carries exactly one mode at a time; its messages
//! are totally ordered by creation timestamp with no ties (the persistence
//! gateway allocates timestamps, see [`crate::store`]).
//!
//! # Completion States
//!
//! An assistant message produced by a streaming generation starts life as a
//! placeholder in [`CompletionState::Incomplete`] and is finalized exactly
//! once: [`CompletionState::Complete`] on success, or
//! [`CompletionState::Aborted`] on cancellation or mid-stream failure.
//! Incomplete and aborted rows are terminal history entries; they are never
//! concatenated with later messages and never fed back into prompt context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mode::Mode;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new unique conversation ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identifier of the user owning a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new unique user ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human user
    User,
    /// The AI assistant
    Assistant,
}

impl MessageRole {
    /// Wire-format name of the role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Completion state of a persisted message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionState {
    /// The message content is final
    #[default]
    Complete,
    /// A streaming generation is still appending content
    Incomplete,
    /// The generation was cancelled or failed; content is the delivered prefix
    Aborted,
}

impl CompletionState {
    /// Whether the message is settled history usable as prompt context
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the message still has a generation writing into it
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

/// Extra data attached to a persisted message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageMetadata {
    /// Canonical directive keyword the user message carried, if any
    pub directive: Option<String>,
}

impl MessageMetadata {
    /// Metadata recording a parsed directive keyword
    #[must_use]
    pub fn with_directive(keyword: impl Into<String>) -> Self {
        Self {
            directive: Some(keyword.into()),
        }
    }
}

/// A message within a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// The conversation this message belongs to
    pub conversation_id: ConversationId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content (empty while a stream placeholder)
    pub content: String,
    /// Completion state
    pub state: CompletionState,
    /// Attached metadata
    pub metadata: MessageMetadata,
    /// When the message was created; allocated by the persistence gateway
    /// on append, strictly increasing within a conversation
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message
    #[must_use]
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            state: CompletionState::Complete,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Create a finalized assistant message
    #[must_use]
    pub fn assistant(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::Assistant,
            content: content.into(),
            state: CompletionState::Complete,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Create an empty placeholder for a streaming generation
    #[must_use]
    pub fn assistant_placeholder(conversation_id: ConversationId) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::Assistant,
            content: String::new(),
            state: CompletionState::Incomplete,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Attach metadata to the message
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// Default title given to a conversation created without one
const DEFAULT_TITLE: &str = "New conversation";

/// A conversation owned by a single user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,
    /// The user owning this conversation
    pub owner: UserId,
    /// Display title
    pub title: String,
    /// Current mode; mutable only through an explicit mode-switch decision
    pub mode: Mode,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Last append or mode switch; drives most-recent-first listing
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation for `owner`
    #[must_use]
    pub fn new(owner: UserId, mode: Mode, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            owner,
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user` owns this conversation
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

// ============================================================================
// Tests
// ============================================================================
