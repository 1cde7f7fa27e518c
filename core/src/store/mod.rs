//! Persistence Gateway
//!
//! Durable append/read of conversations and messages, behind a trait so the
//! orchestration core stays independent of the storage engine. The gateway
//! is the only shared mutable resource in this core; its append operation
//! is atomic and allocates timestamps, which is what makes concurrent
//! appends safe (see [`ConversationStore::append_message`]).

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::conversation::{
    CompletionState, Conversation, ConversationId, Message, MessageId, UserId,
};
use crate::error::CoreResult;
use crate::mode::Mode;

// ============================================================================
// Read Parameters
// ============================================================================

/// Pagination window for reads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of rows to return
    pub limit: usize,
    /// Rows to skip from the start
    pub offset: usize,
}

impl Page {
    /// A window with the given limit, starting at the beginning
    #[must_use]
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    /// A window covering everything
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(100)
    }
}

/// Filter for conversation listings
#[derive(Clone, Copy, Debug, Default)]
pub struct ListFilter {
    /// Only conversations currently in this mode
    pub mode: Option<Mode>,
    /// Pagination window
    pub page: Page,
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Durable storage collaborator for conversations and messages
///
/// Implementations must make `append_message` atomic: two concurrent
/// appends to the same conversation can never produce messages with
/// identical or out-of-order timestamps.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation
    async fn create_conversation(&self, conversation: Conversation) -> CoreResult<Conversation>;

    /// Fetch a conversation by id, failing with `NotFound` if absent
    async fn conversation(&self, id: ConversationId) -> CoreResult<Conversation>;

    /// List a user's conversations, most recently updated first
    async fn list_conversations(
        &self,
        owner: UserId,
        filter: ListFilter,
    ) -> CoreResult<Vec<Conversation>>;

    /// Persist an explicit mode switch
    async fn set_mode(&self, id: ConversationId, mode: Mode) -> CoreResult<()>;

    /// Atomically append a message to its conversation
    ///
    /// The gateway allocates the authoritative creation timestamp, strictly
    /// greater than every earlier timestamp in the conversation, and bumps
    /// the conversation's `updated_at`. Returns the stored message.
    async fn append_message(&self, message: Message) -> CoreResult<Message>;

    /// Read a conversation's messages in creation order
    async fn messages(&self, id: ConversationId, page: Page) -> CoreResult<Vec<Message>>;

    /// Finalize a previously appended message (stream placeholder)
    ///
    /// Sets the content and the terminal completion state. Returns the
    /// updated message. Fails with `NotFound` for an unknown message id.
    async fn finalize_message(
        &self,
        id: MessageId,
        content: String,
        state: CompletionState,
    ) -> CoreResult<Message>;

    /// Delete a conversation, cascading to its messages
    async fn delete_conversation(&self, id: ConversationId) -> CoreResult<()>;
}
