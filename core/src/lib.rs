//! Confab Core - Headless Conversation Orchestration
//!
//! This crate is the orchestration core of confab, a backend that lets a
//! user converse with an AI assistant through text messages optionally
//! prefixed with directive keywords (`#calendar`, `#note`, `#scan`). It is
//! completely independent of any transport or web framework: a router, a
//! daemon, or a test harness drives it through [`ChatService`].
//!
//! # Architecture
//!
//! ```text
//! raw message text
//!       │
//!       ▼
//! ┌────────────────┐    ┌──────────────────────────────┐
//! │ Directive      │───▶│ Mode Selector                 │
//! │ Parser         │    │ (consults/updates conversation │
//! └────────────────┘    │  mode via the gateway)         │
//!                       └──────────────┬────────────────┘
//!                                      ▼
//!                       ┌──────────────────────────────┐
//!                       │ Prompt Assembler              │
//!                       │ (history via the gateway)     │
//!                       └──────────────┬────────────────┘
//!                                      ▼
//!   ┌──────────────┐    ┌──────────────────────────────┐
//!   │ Conversation │───▶│ AI Response Orchestrator      │
//!   │ Sequencer    │    │ (blocking or streaming)       │
//!   └──────────────┘    └──────────────┬────────────────┘
//!                                      ▼
//!                        single response, or ordered chunks
//!                        finalized through the Persistence Gateway
//! ```
//!
//! # Key Types
//!
//! - [`ChatService`]: the request/response surface (create/list/get/send/
//!   send-stream/delete)
//! - [`ChatProvider`]: the external AI provider capability set
//!   (`complete` + `stream`), implemented by [`AnthropicProvider`]
//! - [`ConversationStore`]: the persistence gateway, implemented in memory
//!   by [`MemoryStore`]
//! - [`ConversationSequencer`]: per-conversation mutual exclusion, at most
//!   one generation in flight per conversation
//! - [`ModeRegistry`]: immutable mode → system-prompt mapping
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use confab_core::{AnthropicProvider, ChatService, CoreConfig, MemoryStore, UserId};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = confab_core::config::load_config()?;
//!     let provider = Arc::new(AnthropicProvider::new(
//!         config.api_key.clone().expect("api key"),
//!     ));
//!     let service = ChatService::new(Arc::new(MemoryStore::new()), provider, config);
//!
//!     let owner = UserId::new();
//!     let conversation = service.create_conversation(owner, None, None).await?;
//!     let reply = service
//!         .send_message(conversation.id, owner, "#note buy milk")
//!         .await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency Model
//!
//! Many conversations are processed concurrently, but each conversation's
//! generation pipeline is serialized by the [`ConversationSequencer`]:
//! within one conversation, message append order equals request arrival
//! order at the sequencer, and racing requests either wait or fail with
//! `Busy`. Closing a client stream cancels the generation, halts the
//! upstream provider call, finalizes the partial message as `aborted`, and
//! releases the slot.
//!
//! # Module Overview
//!
//! - [`config`]: TOML + environment configuration
//! - [`conversation`]: conversations, messages, identifiers
//! - [`directive`]: `#keyword argument` parsing
//! - [`error`]: the crate error taxonomy
//! - [`mode`]: mode registry and per-turn mode selection
//! - [`orchestrator`]: provider invocation, retry/timeout, finalization
//! - [`prompt`]: prompt context assembly
//! - [`provider`]: AI provider trait and the Anthropic-style client
//! - [`sequencer`]: per-conversation mutual exclusion
//! - [`service`]: the public request/response surface
//! - [`store`]: persistence gateway trait and in-memory implementation

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod conversation;
pub mod directive;
pub mod error;
pub mod mode;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod sequencer;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use config::{default_config_path, load_config, load_config_from_path, ConfigError, CoreConfig};
pub use conversation::{
    CompletionState, Conversation, ConversationId, Message, MessageId, MessageMetadata,
    MessageRole, UserId,
};
pub use directive::{Directive, KnownKeyword, DIRECTIVE_MARKER};
pub use error::{CoreError, CoreResult};
pub use mode::{Mode, ModeRegistry, Selection, SelectionAction};
pub use orchestrator::{OrchestratorConfig, ResponseOrchestrator, StreamChunk};
pub use prompt::{PromptAssembler, PromptContext, PromptMessage};
pub use provider::{AnthropicProvider, ChatProvider, ProviderEvent, ProviderReply, ProviderRequest};
pub use sequencer::{ConversationSequencer, SequencerConfig, SequencerStats, SlotGuard};
pub use service::ChatService;
pub use store::{ConversationStore, ListFilter, MemoryStore, Page};
