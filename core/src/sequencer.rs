//! Conversation Sequencer
//!
//! Per-conversation mutual exclusion for generations. At most one
//! generation (one invocation of the AI provider producing one assistant
//! message) may be in flight per conversation at any instant; requests on
//! different conversations proceed independently with no shared lock.
//!
//! Acquisition order is arrival order: two requests racing to start are
//! ordered by acquisition, and the second waits for the first's full
//! completion (or abort) before starting, so history is never interleaved.
//!
//! The slot is released when the guard is dropped, so explicit release and
//! holder-task termination (success, error, or cancellation) are the same
//! code path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::conversation::ConversationId;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the sequencer
#[derive(Clone, Copy, Debug)]
pub struct SequencerConfig {
    /// How long `acquire` may wait for a busy slot.
    ///
    /// `Duration::ZERO` configures the fail-fast policy: a busy slot yields
    /// `Busy` immediately.
    pub acquire_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Sequencer
// ============================================================================

/// Lifetime counters for observability
#[derive(Clone, Copy, Debug, Default)]
pub struct SequencerStats {
    /// Successful acquisitions
    pub total_acquires: u64,
    /// Requests rejected with `Busy`
    pub busy_rejections: u64,
    /// Conversations with a slot entry
    pub tracked_slots: usize,
}

/// Per-conversation serialization point
pub struct ConversationSequencer {
    /// One single-permit semaphore per conversation
    slots: DashMap<ConversationId, Arc<Semaphore>>,
    config: SequencerConfig,
    total_acquires: AtomicU64,
    busy_rejections: AtomicU64,
}

impl ConversationSequencer {
    /// Create a sequencer with the given configuration
    #[must_use]
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
            total_acquires: AtomicU64::new(0),
            busy_rejections: AtomicU64::new(0),
        }
    }

    /// The slot semaphore for a conversation, created on first use
    fn slot(&self, id: ConversationId) -> Arc<Semaphore> {
        self.slots
            .entry(id)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Acquire exclusive generation access for a conversation
    ///
    /// Waits up to the configured bound (FIFO order), then fails with
    /// [`CoreError::Busy`]. With a zero bound, fails fast instead of
    /// waiting.
    pub async fn acquire(&self, id: ConversationId) -> CoreResult<SlotGuard> {
        let semaphore = self.slot(id);

        let permit = if self.config.acquire_timeout.is_zero() {
            semaphore.try_acquire_owned().ok()
        } else {
            tokio::time::timeout(self.config.acquire_timeout, semaphore.acquire_owned())
                .await
                .ok()
                .and_then(Result::ok)
        };

        match permit {
            Some(permit) => {
                self.total_acquires.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(conversation = %id, "Acquired generation slot");
                Ok(SlotGuard {
                    conversation_id: id,
                    _permit: permit,
                })
            }
            None => {
                self.busy_rejections.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(conversation = %id, "Generation slot busy");
                Err(CoreError::Busy(id))
            }
        }
    }

    /// Acquire without waiting, regardless of the configured bound
    pub fn try_acquire(&self, id: ConversationId) -> CoreResult<SlotGuard> {
        match self.slot(id).try_acquire_owned() {
            Ok(permit) => {
                self.total_acquires.fetch_add(1, Ordering::Relaxed);
                Ok(SlotGuard {
                    conversation_id: id,
                    _permit: permit,
                })
            }
            Err(_) => {
                self.busy_rejections.fetch_add(1, Ordering::Relaxed);
                Err(CoreError::Busy(id))
            }
        }
    }

    /// Whether a generation currently holds the conversation's slot
    #[must_use]
    pub fn is_busy(&self, id: ConversationId) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.available_permits() == 0)
    }

    /// Drop the slot entry for a deleted conversation
    ///
    /// Skipped while a generation holds the slot; the held permit keeps the
    /// semaphore alive and removal would let a second generation start.
    pub fn remove(&self, id: ConversationId) {
        self.slots
            .remove_if(&id, |_, slot| slot.available_permits() == 1);
    }

    /// Lifetime counters
    #[must_use]
    pub fn stats(&self) -> SequencerStats {
        SequencerStats {
            total_acquires: self.total_acquires.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            tracked_slots: self.slots.len(),
        }
    }
}

impl Default for ConversationSequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

/// Exclusive access to a conversation's generation slot (RAII)
///
/// Dropping the guard releases the slot.
pub struct SlotGuard {
    conversation_id: ConversationId,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    /// The conversation this guard serializes
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
