//! Chat Service
//!
//! The request/response surface the orchestration core offers to the
//! (excluded) presentation layer: conversation CRUD plus the blocking and
//! streaming send paths. This is where the pipeline is wired together:
//!
//! ```text
//! raw text ──▶ directive parser ──▶ mode selector ──▶ prompt assembler
//!                                        │                  │
//!                                   (mode switch        (history via
//!                                    persisted)          the gateway)
//!                                                           │
//!              conversation sequencer ──▶ response orchestrator ──▶ chunks
//! ```
//!
//! Every send acquires the conversation's sequencer slot before touching
//! history, so message append order equals request arrival order and a
//! `Busy` rejection has no side effects.

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;

use crate::config::CoreConfig;
use crate::conversation::{Conversation, ConversationId, Message, MessageMetadata, UserId};
use crate::directive;
use crate::error::{CoreError, CoreResult};
use crate::mode::{self, Mode, ModeRegistry, SelectionAction};
use crate::orchestrator::{OrchestratorConfig, ResponseOrchestrator, StreamChunk};
use crate::prompt::PromptAssembler;
use crate::provider::{ChatProvider, ProviderRequest};
use crate::sequencer::{ConversationSequencer, SequencerConfig};
use crate::store::{ConversationStore, ListFilter, Page};

/// The conversation orchestration service
pub struct ChatService<P> {
    store: Arc<dyn ConversationStore>,
    registry: Arc<ModeRegistry>,
    assembler: PromptAssembler,
    orchestrator: ResponseOrchestrator<P>,
    sequencer: Arc<ConversationSequencer>,
    config: CoreConfig,
}

impl<P: ChatProvider + 'static> ChatService<P> {
    /// Wire the service over a persistence gateway and an AI provider
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, provider: Arc<P>, config: CoreConfig) -> Self {
        let registry = Arc::new(ModeRegistry::with_locale(&config.locale));
        let assembler = PromptAssembler::new(Arc::clone(&registry), config.max_context_messages);
        let orchestrator = ResponseOrchestrator::new(
            provider,
            Arc::clone(&store),
            OrchestratorConfig {
                request_timeout: config.request_timeout(),
                max_retries: config.retry_max_attempts,
                retry_backoff: config.retry_backoff(),
                ..OrchestratorConfig::default()
            },
        );
        let sequencer = Arc::new(ConversationSequencer::new(SequencerConfig {
            acquire_timeout: config.acquire_timeout(),
        }));

        Self {
            store,
            registry,
            assembler,
            orchestrator,
            sequencer,
            config,
        }
    }

    /// The immutable mode registry the service was built with
    #[must_use]
    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    /// The per-conversation sequencer (for observability)
    #[must_use]
    pub fn sequencer(&self) -> &ConversationSequencer {
        &self.sequencer
    }

    // ========================================================================
    // Conversation CRUD
    // ========================================================================

    /// Create a conversation for `owner`
    pub async fn create_conversation(
        &self,
        owner: UserId,
        initial_mode: Option<Mode>,
        title: Option<String>,
    ) -> CoreResult<Conversation> {
        let mode = initial_mode.unwrap_or_default();
        self.store
            .create_conversation(Conversation::new(owner, mode, title))
            .await
    }

    /// List `owner`'s conversations, most recently updated first
    pub async fn list_conversations(
        &self,
        owner: UserId,
        filter: ListFilter,
    ) -> CoreResult<Vec<Conversation>> {
        self.store.list_conversations(owner, filter).await
    }

    /// Fetch a conversation and its messages
    pub async fn get_conversation(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> CoreResult<(Conversation, Vec<Message>)> {
        let conversation = self.authorize(id, owner).await?;
        let messages = self.store.messages(id, Page::unbounded()).await?;
        Ok((conversation, messages))
    }

    /// Read a window of a conversation's messages in creation order
    pub async fn messages(
        &self,
        id: ConversationId,
        owner: UserId,
        page: Page,
    ) -> CoreResult<Vec<Message>> {
        self.authorize(id, owner).await?;
        self.store.messages(id, page).await
    }

    /// Delete a conversation, cascading to its messages
    pub async fn delete_conversation(&self, id: ConversationId, owner: UserId) -> CoreResult<()> {
        self.authorize(id, owner).await?;
        self.store.delete_conversation(id).await?;
        self.sequencer.remove(id);
        tracing::info!(conversation = %id, "Conversation deleted");
        Ok(())
    }

    // ========================================================================
    // Send Paths
    // ========================================================================

    /// Send a message and wait for the complete assistant response
    pub async fn send_message(
        &self,
        id: ConversationId,
        owner: UserId,
        text: &str,
    ) -> CoreResult<Message> {
        self.validate_text(text)?;
        self.authorize(id, owner).await?;

        let _guard = self.sequencer.acquire(id).await?;
        // Re-read under the slot: a racing turn may have switched the mode
        let conversation = self.store.conversation(id).await?;
        let request = self.prepare_turn(&conversation, text).await?;

        self.orchestrator.generate(id, request).await
    }

    /// Send a message and stream the assistant response
    ///
    /// The stream yields text deltas followed by exactly one terminal
    /// chunk. Dropping the stream cancels the generation: the upstream
    /// exchange halts, the partial message is persisted as `aborted`, and
    /// the conversation slot is released.
    pub async fn send_message_stream(
        &self,
        id: ConversationId,
        owner: UserId,
        text: &str,
    ) -> CoreResult<ReceiverStream<StreamChunk>> {
        self.validate_text(text)?;
        self.authorize(id, owner).await?;

        let guard = self.sequencer.acquire(id).await?;
        let conversation = self.store.conversation(id).await?;
        let request = self.prepare_turn(&conversation, text).await?;

        let rx = self.orchestrator.generate_stream(id, request, guard).await?;
        Ok(ReceiverStream::new(rx))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Reject malformed request shapes
    fn validate_text(&self, text: &str) -> CoreResult<()> {
        if text.trim().is_empty() {
            return Err(CoreError::Validation("message is empty".to_string()));
        }
        if text.len() > self.config.max_message_bytes {
            return Err(CoreError::Validation(format!(
                "message exceeds {} bytes",
                self.config.max_message_bytes
            )));
        }
        Ok(())
    }

    /// Fetch a conversation, failing `NotFound`/`Forbidden` on mismatch
    async fn authorize(&self, id: ConversationId, owner: UserId) -> CoreResult<Conversation> {
        let conversation = self.store.conversation(id).await?;
        if !conversation.is_owned_by(owner) {
            return Err(CoreError::Forbidden(id));
        }
        Ok(conversation)
    }

    /// Run the pre-generation pipeline for one turn
    ///
    /// Parses the directive, applies the mode decision, persists the user
    /// message (with directive metadata), and assembles the provider
    /// request. Must be called while holding the conversation's slot.
    async fn prepare_turn(
        &self,
        conversation: &Conversation,
        text: &str,
    ) -> CoreResult<ProviderRequest> {
        let parsed = directive::parse(text);
        let selection = mode::select(Some(conversation.mode), parsed.as_ref());

        if let SelectionAction::PersistSwitch(new_mode) = &selection.action {
            self.store.set_mode(conversation.id, *new_mode).await?;
            tracing::info!(
                conversation = %conversation.id,
                from = %conversation.mode,
                to = %new_mode,
                "Mode switched"
            );
        }
        let meta = match &selection.action {
            SelectionAction::MetaInstruction(d) => Some(d),
            _ => None,
        };

        // History is read before the new user message is appended; the
        // assembler appends the new message last itself.
        let history = self
            .store
            .messages(conversation.id, Page::unbounded())
            .await?;

        let metadata = parsed
            .as_ref()
            .map_or_else(MessageMetadata::default, |d| {
                MessageMetadata::with_directive(d.canonical_keyword())
            });
        self.store
            .append_message(Message::user(conversation.id, text).with_metadata(metadata))
            .await?;

        let context =
            self.assembler
                .assemble_from_history(&history, selection.effective, meta, text);

        Ok(ProviderRequest::new(&self.config.model, context)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature))
    }
}

// ============================================================================
// Tests
// ============================================================================
