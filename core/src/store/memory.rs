//! In-Memory Persistence Gateway
//!
//! The reference [`ConversationStore`] implementation. Keeps everything
//! under one `parking_lot` lock, which is what makes `append_message`
//! atomic: timestamp allocation and the insert happen in a single critical
//! section, so concurrent appends to one conversation can never tie or
//! reorder.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::conversation::{
    CompletionState, Conversation, ConversationId, Message, MessageId, UserId,
};
use crate::error::{CoreError, CoreResult};
use crate::mode::Mode;
use crate::store::{ConversationStore, ListFilter, Page};

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    /// Messages per conversation, in creation order
    messages: HashMap<ConversationId, Vec<Message>>,
    /// Reverse index for finalization
    by_message: HashMap<MessageId, ConversationId>,
}

/// In-memory conversation store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.inner.read().conversations.len()
    }

    /// Allocate the next timestamp for a conversation
    ///
    /// Strictly greater than the previous message's timestamp, even when
    /// the wall clock has not advanced.
    fn allocate_timestamp(history: &[Message]) -> DateTime<Utc> {
        let now = Utc::now();
        match history.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::milliseconds(1),
            _ => now,
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, conversation: Conversation) -> CoreResult<Conversation> {
        let mut inner = self.inner.write();
        inner.messages.entry(conversation.id).or_default();
        inner.conversations.insert(conversation.id, conversation.clone());
        tracing::debug!(conversation = %conversation.id, mode = %conversation.mode, "Created conversation");
        Ok(conversation)
    }

    async fn conversation(&self, id: ConversationId) -> CoreResult<Conversation> {
        self.inner
            .read()
            .conversations
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound(id))
    }

    async fn list_conversations(
        &self,
        owner: UserId,
        filter: ListFilter,
    ) -> CoreResult<Vec<Conversation>> {
        let inner = self.inner.read();
        let mut listed: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.owner == owner)
            .filter(|c| filter.mode.is_none_or(|mode| c.mode == mode))
            .cloned()
            .collect();

        // Most recently updated first; id as a stable tiebreaker across
        // conversations created in the same instant.
        listed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.0.cmp(&a.id.0)));

        Ok(listed
            .into_iter()
            .skip(filter.page.offset)
            .take(filter.page.limit)
            .collect())
    }

    async fn set_mode(&self, id: ConversationId, mode: Mode) -> CoreResult<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or(CoreError::NotFound(id))?;
        conversation.mode = mode;
        conversation.updated_at = Utc::now();
        tracing::debug!(conversation = %id, mode = %mode, "Persisted mode switch");
        Ok(())
    }

    async fn append_message(&self, mut message: Message) -> CoreResult<Message> {
        let mut inner = self.inner.write();
        let conversation_id = message.conversation_id;
        if !inner.conversations.contains_key(&conversation_id) {
            return Err(CoreError::NotFound(conversation_id));
        }

        let history = inner.messages.entry(conversation_id).or_default();
        message.created_at = Self::allocate_timestamp(history);
        history.push(message.clone());

        inner.by_message.insert(message.id, conversation_id);
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.updated_at = message.created_at;
        }

        Ok(message)
    }

    async fn messages(&self, id: ConversationId, page: Page) -> CoreResult<Vec<Message>> {
        let inner = self.inner.read();
        if !inner.conversations.contains_key(&id) {
            return Err(CoreError::NotFound(id));
        }
        let history = inner.messages.get(&id).map_or(&[][..], Vec::as_slice);
        Ok(history
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn finalize_message(
        &self,
        id: MessageId,
        content: String,
        state: CompletionState,
    ) -> CoreResult<Message> {
        let mut inner = self.inner.write();
        let conversation_id = *inner
            .by_message
            .get(&id)
            .ok_or_else(|| CoreError::Validation(format!("unknown message {id}")))?;

        let history = inner
            .messages
            .get_mut(&conversation_id)
            .ok_or(CoreError::NotFound(conversation_id))?;
        let message = history
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CoreError::Validation(format!("unknown message {id}")))?;

        message.content = content;
        message.state = state;
        let updated = message.clone();

        tracing::debug!(
            conversation = %conversation_id,
            message = %id,
            state = ?state,
            "Finalized message"
        );
        Ok(updated)
    }

    async fn delete_conversation(&self, id: ConversationId) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if inner.conversations.remove(&id).is_none() {
            return Err(CoreError::NotFound(id));
        }
        if let Some(history) = inner.messages.remove(&id) {
            for message in &history {
                inner.by_message.remove(&message.id);
            }
        }
        tracing::debug!(conversation = %id, "Deleted conversation");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
