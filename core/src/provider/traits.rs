//! AI Provider Traits
//!
//! Trait definitions for the external AI provider. The abstraction keeps
//! the orchestration core independent of any one vendor API: a provider
//! offers a blocking completion and an ordered chunk stream, nothing else.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::prompt::{PromptContext, PromptMessage};

// ============================================================================
// Requests and Events
// ============================================================================

/// Chunk-stream events from a provider
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// A text chunk of the response, in arrival order
    Delta(String),
    /// Response completed successfully
    Done {
        /// The complete response text
        text: String,
    },
    /// Error occurred during streaming
    Error(String),
}

/// One generation request to the provider
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    /// Model identifier (provider-specific)
    pub model: String,
    /// System prompt for the turn
    pub system: String,
    /// Ordered conversation turns, new user message last
    pub messages: Vec<PromptMessage>,
    /// Maximum tokens in the response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl ProviderRequest {
    /// Build a request from an assembled prompt context
    #[must_use]
    pub fn new(model: impl Into<String>, context: PromptContext) -> Self {
        Self {
            model: model.into(),
            system: context.system,
            messages: context.messages,
            max_tokens: 4096,
            temperature: 1.0,
        }
    }

    /// Set the response token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Response from a blocking provider request
#[derive(Clone, Debug)]
pub struct ProviderReply {
    /// The response text
    pub text: String,
    /// Model that generated the response
    pub model: String,
    /// Output tokens used, if reported
    pub tokens_used: Option<u32>,
    /// Wall-clock generation time in milliseconds
    pub duration_ms: Option<u64>,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// External AI provider
///
/// Implement this trait to add support for a different vendor API.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name (e.g. "Anthropic")
    fn name(&self) -> &str;

    /// Check whether the provider endpoint is reachable
    async fn health_check(&self) -> bool;

    /// Send a request and wait for the complete response
    async fn complete(&self, request: &ProviderRequest) -> anyhow::Result<ProviderReply>;

    /// Send a request and receive the response as an ordered chunk stream
    ///
    /// The returned channel yields [`ProviderEvent`]s in arrival order and
    /// closes after the terminal `Done` or `Error` event. Dropping the
    /// receiver halts the upstream exchange.
    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>>;
}
