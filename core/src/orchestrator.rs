//! AI Response Orchestrator
//!
//! Invokes the external AI provider, as a single blocking call or as an
//! incrementally-delivered chunk stream, and owns the failure discipline
//! around it:
//!
//! - a bounded wait on the upstream call (`ProviderTimeout`),
//! - at most one retry, applied only before anything has been sent
//!   downstream, with jittered backoff,
//! - finalization of the streaming placeholder on *every* exit path:
//!   `complete` on success, `aborted` on cancellation, mid-stream error,
//!   or inter-chunk timeout. An orphaned in-progress row is a bug, not an
//!   acceptable outcome.
//!
//! Cancellation is the caller dropping the chunk receiver (client
//! disconnect). The orchestrator notices the failed send, stops consuming
//! the upstream stream (which halts the upstream exchange), finalizes the
//! placeholder as `aborted` with exactly the prefix already delivered, and
//! releases the conversation slot by dropping the guard it holds.
//!
//! Chunk ordering from the provider is assumed already ordered; nothing
//! here reorders or buffers beyond the channel between tasks.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::conversation::{CompletionState, ConversationId, Message, MessageId};
use crate::error::{CoreError, CoreResult};
use crate::provider::{ChatProvider, ProviderEvent, ProviderReply, ProviderRequest};
use crate::sequencer::SlotGuard;
use crate::store::ConversationStore;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the orchestrator
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    /// Bound on each upstream wait: the blocking call, the stream opening,
    /// and every inter-chunk gap
    pub request_timeout: Duration,
    /// Retries permitted before the first byte (0 disables retrying)
    pub max_retries: u32,
    /// Base backoff between attempts; actual delay is jittered ±50%
    pub retry_backoff: Duration,
    /// Capacity of the downstream chunk channel
    pub channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 1,
            retry_backoff: Duration::from_millis(250),
            channel_capacity: 64,
        }
    }
}

// ============================================================================
// Stream Chunks
// ============================================================================

/// Events delivered to the caller of a streaming generation
#[derive(Clone, Debug)]
pub enum StreamChunk {
    /// A text chunk, in provider order
    Delta(String),
    /// The generation finished; the message is finalized `complete`
    Done {
        /// The persisted assistant message
        message: Message,
    },
    /// The generation failed or timed out mid-stream; the message is
    /// finalized `aborted` with the delivered prefix
    Failed {
        /// Id of the aborted message row
        message_id: MessageId,
        /// Error description
        error: String,
    },
}

impl StreamChunk {
    /// Whether this chunk terminates the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }

    /// Fold a chunk into a result, for callers that only care about the
    /// outcome: `Done` yields the persisted message, `Failed` becomes
    /// [`CoreError::StreamAborted`], deltas yield nothing.
    pub fn into_result(self) -> CoreResult<Option<Message>> {
        match self {
            Self::Delta(_) => Ok(None),
            Self::Done { message } => Ok(Some(message)),
            Self::Failed { error, .. } => Err(CoreError::StreamAborted(error)),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives provider generations and their persistence lifecycle
pub struct ResponseOrchestrator<P> {
    provider: Arc<P>,
    store: Arc<dyn ConversationStore>,
    config: OrchestratorConfig,
}

impl<P: ChatProvider + 'static> ResponseOrchestrator<P> {
    /// Create an orchestrator over a provider and the persistence gateway
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn ConversationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Jittered backoff delay for a retry attempt
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff.as_millis() as u64;
        let scaled = base.saturating_mul(1u64 << attempt.min(8));
        // ±50% jitter so concurrent retries do not synchronize
        let jittered = rand::thread_rng().gen_range(scaled / 2..=scaled + scaled / 2);
        Duration::from_millis(jittered.max(1))
    }

    /// Blocking generation: wait for the complete response and persist it
    ///
    /// Returns the finalized `complete` assistant message. Fails with
    /// `Provider` on upstream errors and `ProviderTimeout` when the bounded
    /// wait elapses; no assistant row is left behind on failure.
    pub async fn generate(
        &self,
        conversation_id: ConversationId,
        request: ProviderRequest,
    ) -> CoreResult<Message> {
        let reply = self.complete_with_retry(&request).await?;

        let message = self
            .store
            .append_message(Message::assistant(conversation_id, reply.text))
            .await?;

        tracing::info!(
            conversation = %conversation_id,
            message = %message.id,
            provider = self.provider.name(),
            tokens = reply.tokens_used,
            duration_ms = reply.duration_ms,
            "Generation complete"
        );
        Ok(message)
    }

    /// Streaming generation: forward ordered chunks as they arrive
    ///
    /// Opens the upstream stream (with the pre-first-byte retry budget),
    /// persists an `incomplete` placeholder, and spawns the forwarding task
    /// that owns the placeholder's finalization and the conversation slot
    /// guard. The receiver yields deltas followed by exactly one terminal
    /// chunk; dropping it cancels the generation.
    pub async fn generate_stream(
        &self,
        conversation_id: ConversationId,
        request: ProviderRequest,
        guard: SlotGuard,
    ) -> CoreResult<mpsc::Receiver<StreamChunk>> {
        let upstream = self.open_stream_with_retry(&request).await?;

        let placeholder = self
            .store
            .append_message(Message::assistant_placeholder(conversation_id))
            .await?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let store = Arc::clone(&self.store);
        let timeout = self.config.request_timeout;

        tokio::spawn(forward_stream(
            upstream,
            tx,
            store,
            placeholder.id,
            conversation_id,
            timeout,
            guard,
        ));

        Ok(rx)
    }

    /// Blocking call with the bounded wait and pre-first-byte retry budget
    async fn complete_with_retry(&self, request: &ProviderRequest) -> CoreResult<ProviderReply> {
        let mut last_error = CoreError::Provider("no attempt made".to_string());

        for attempt in 0..=self.config.max_retries {
            match tokio::time::timeout(self.config.request_timeout, self.provider.complete(request))
                .await
            {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "Provider call failed");
                    last_error = CoreError::Provider(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(attempt, "Provider call timed out");
                    last_error = CoreError::ProviderTimeout {
                        timeout_ms: self.config.request_timeout.as_millis() as u64,
                    };
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(last_error)
    }

    /// Open the upstream stream, retrying within the pre-first-byte budget
    async fn open_stream_with_retry(
        &self,
        request: &ProviderRequest,
    ) -> CoreResult<mpsc::Receiver<ProviderEvent>> {
        let mut last_error = CoreError::Provider("no attempt made".to_string());

        for attempt in 0..=self.config.max_retries {
            match tokio::time::timeout(self.config.request_timeout, self.provider.stream(request))
                .await
            {
                Ok(Ok(upstream)) => return Ok(upstream),
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "Provider stream failed to open");
                    last_error = CoreError::Provider(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(attempt, "Provider stream open timed out");
                    last_error = CoreError::ProviderTimeout {
                        timeout_ms: self.config.request_timeout.as_millis() as u64,
                    };
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(last_error)
    }
}

// ============================================================================
// Forwarding Task
// ============================================================================

/// Forward upstream events downstream and finalize the placeholder
///
/// Owns the slot guard: the conversation stays exclusive until this task
/// returns, whatever the exit path.
async fn forward_stream(
    mut upstream: mpsc::Receiver<ProviderEvent>,
    tx: mpsc::Sender<StreamChunk>,
    store: Arc<dyn ConversationStore>,
    message_id: MessageId,
    conversation_id: ConversationId,
    timeout: Duration,
    guard: SlotGuard,
) {
    // Content successfully handed to the caller's channel so far
    let mut delivered = String::new();

    loop {
        let event = match tokio::time::timeout(timeout, upstream.recv()).await {
            Ok(event) => event,
            Err(_) => {
                let error = format!("provider stalled for more than {} ms", timeout.as_millis());
                abort_stream(&store, message_id, &delivered, &error).await;
                let _ = tx.send(StreamChunk::Failed { message_id, error }).await;
                break;
            }
        };

        match event {
            Some(ProviderEvent::Delta(text)) => {
                if tx.send(StreamChunk::Delta(text.clone())).await.is_err() {
                    // Caller dropped the receiver: cancellation. Stop
                    // consuming upstream (halting the exchange) and keep
                    // exactly what was already delivered.
                    tracing::info!(
                        conversation = %conversation_id,
                        message = %message_id,
                        delivered_bytes = delivered.len(),
                        "Stream cancelled by caller"
                    );
                    abort_stream(&store, message_id, &delivered, "cancelled by caller").await;
                    break;
                }
                delivered.push_str(&text);
            }

            Some(ProviderEvent::Done { text }) => {
                // The provider's terminal text is canonical; fall back to
                // the delivered concatenation if it is absent.
                let content = if text.is_empty() { delivered.clone() } else { text };
                match store
                    .finalize_message(message_id, content, CompletionState::Complete)
                    .await
                {
                    Ok(message) => {
                        tracing::info!(
                            conversation = %conversation_id,
                            message = %message_id,
                            bytes = message.content.len(),
                            "Stream complete"
                        );
                        let _ = tx.send(StreamChunk::Done { message }).await;
                    }
                    Err(e) => {
                        let error = format!("failed to finalize message: {e}");
                        tracing::error!(message = %message_id, %error, "Finalization failed");
                        let _ = tx.send(StreamChunk::Failed { message_id, error }).await;
                    }
                }
                break;
            }

            Some(ProviderEvent::Error(error)) => {
                // No retry once streaming has begun; surface and abort.
                abort_stream(&store, message_id, &delivered, &error).await;
                let _ = tx.send(StreamChunk::Failed { message_id, error }).await;
                break;
            }

            None => {
                let error = "provider stream disconnected".to_string();
                abort_stream(&store, message_id, &delivered, &error).await;
                let _ = tx.send(StreamChunk::Failed { message_id, error }).await;
                break;
            }
        }
    }

    drop(guard);
}

/// Finalize a placeholder as aborted with the delivered prefix
async fn abort_stream(
    store: &Arc<dyn ConversationStore>,
    message_id: MessageId,
    delivered: &str,
    reason: &str,
) {
    tracing::warn!(message = %message_id, reason, "Aborting stream");
    if let Err(e) = store
        .finalize_message(message_id, delivered.to_string(), CompletionState::Aborted)
        .await
    {
        tracing::error!(message = %message_id, error = %e, "Failed to mark message aborted");
    }
}

// ============================================================================
// Tests
// ============================================================================
