//! Prompt Assembly
//!
//! Builds the ordered context sent to the AI provider: the mode's system
//! prompt (plus an optional directive meta-instruction), the conversation's
//! settled history bounded to a configurable window, and the new user
//! message last.
//!
//! Incomplete and aborted assistant rows represent failed or in-progress
//! generations, not settled history; they are never included in the context
//! sent upstream. Assembly is a pure function over its inputs plus one read
//! from the persistence gateway.

use crate::conversation::{ConversationId, Message, MessageRole};
use crate::directive::Directive;
use crate::error::CoreResult;
use crate::mode::{Mode, ModeRegistry};
use crate::store::{ConversationStore, Page};

// ============================================================================
// Context Types
// ============================================================================

/// One turn of context sent upstream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptMessage {
    /// Who authored the turn
    pub role: MessageRole,
    /// Turn content
    pub content: String,
}

impl PromptMessage {
    /// Build a prompt turn from a persisted message
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// The assembled, ordered context for one generation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptContext {
    /// System prompt: the mode template, plus the meta-instruction when the
    /// turn carried a mode-neutral directive
    pub system: String,
    /// Prior settled messages in creation order, then the new user message
    pub messages: Vec<PromptMessage>,
}

impl PromptContext {
    /// The final message of the context (the new user message)
    #[must_use]
    pub fn latest(&self) -> Option<&PromptMessage> {
        self.messages.last()
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Builds prompt contexts from conversation history
#[derive(Clone, Debug)]
pub struct PromptAssembler {
    registry: std::sync::Arc<ModeRegistry>,
    max_context_messages: usize,
}

impl PromptAssembler {
    /// Create an assembler over the given registry
    #[must_use]
    pub fn new(registry: std::sync::Arc<ModeRegistry>, max_context_messages: usize) -> Self {
        Self {
            registry,
            max_context_messages,
        }
    }

    /// Assemble the context for one turn, reading history from the gateway
    ///
    /// `user_text` is the new user message; it is appended last and must
    /// not already be part of the stored history read here.
    pub async fn assemble(
        &self,
        store: &dyn ConversationStore,
        conversation_id: ConversationId,
        mode: Mode,
        meta: Option<&Directive>,
        user_text: &str,
    ) -> CoreResult<PromptContext> {
        let history = store.messages(conversation_id, Page::unbounded()).await?;
        Ok(self.assemble_from_history(&history, mode, meta, user_text))
    }

    /// Pure assembly over an already-read history slice
    #[must_use]
    pub fn assemble_from_history(
        &self,
        history: &[Message],
        mode: Mode,
        meta: Option<&Directive>,
        user_text: &str,
    ) -> PromptContext {
        let eligible: Vec<&Message> = history
            .iter()
            .filter(|m| m.state.is_settled())
            .collect();

        // Oldest-first truncation when the window is exceeded
        let start = eligible.len().saturating_sub(self.max_context_messages);
        let truncated = eligible.len() - start;
        if start > 0 {
            tracing::debug!(
                kept = truncated,
                dropped = start,
                "Truncated prompt history"
            );
        }

        let mut messages: Vec<PromptMessage> = eligible[start..]
            .iter()
            .map(|m| PromptMessage::from_message(m))
            .collect();
        messages.push(PromptMessage {
            role: MessageRole::User,
            content: user_text.to_string(),
        });

        let mut system = self.registry.system_prompt(mode).to_string();
        if let Some(directive) = meta {
            system.push_str("\n\n");
            system.push_str(&meta_instruction(directive));
        }

        PromptContext { system, messages }
    }
}

/// Render a mode-neutral directive as a system-prompt meta-instruction
fn meta_instruction(directive: &Directive) -> String {
    if directive.argument.is_empty() {
        format!(
            "The user prefixed this message with the '#{}' directive. \
             Acknowledge the request; it is routed to the matching external \
             handler after this turn.",
            directive.canonical_keyword()
        )
    } else {
        format!(
            "The user prefixed this message with the '#{}' directive \
             (argument: \"{}\"). Acknowledge the request; it is routed to \
             the matching external handler after this turn.",
            directive.canonical_keyword(),
            directive.argument
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::conversation::{CompletionState, Conversation, UserId};
    use crate::directive;
    use crate::store::MemoryStore;

    fn assembler(max: usize) -> PromptAssembler {
        PromptAssembler::new(Arc::new(ModeRegistry::with_locale("en")), max)
    }

    fn settled(conv: ConversationId, role: MessageRole, content: &str) -> Message {
        match role {
            MessageRole::User => Message::user(conv, content),
            MessageRole::Assistant => Message::assistant(conv, content),
        }
    }

    #[test]
    fn test_system_prompt_matches_mode() {
        let asm = assembler(10);
        let ctx = asm.assemble_from_history(&[], Mode::Note, None, "structure this");
        assert_eq!(
            ctx.system,
            ModeRegistry::with_locale("en").system_prompt(Mode::Note)
        );
    }

    #[test]
    fn test_new_user_message_is_last() {
        let conv = ConversationId::new();
        let history = vec![
            settled(conv, MessageRole::User, "first"),
            settled(conv, MessageRole::Assistant, "reply"),
        ];
        let ctx = assembler(10).assemble_from_history(&history, Mode::Chat, None, "second");

        assert_eq!(ctx.messages.len(), 3);
        assert_eq!(ctx.latest().unwrap().content, "second");
        assert_eq!(ctx.latest().unwrap().role, MessageRole::User);
        assert_eq!(ctx.messages[0].content, "first");
        assert_eq!(ctx.messages[1].content, "reply");
    }

    #[test]
    fn test_oldest_first_truncation() {
        let conv = ConversationId::new();
        let history: Vec<Message> = (0..6)
            .map(|i| settled(conv, MessageRole::User, &format!("m{i}")))
            .collect();
        let ctx = assembler(3).assemble_from_history(&history, Mode::Chat, None, "new");

        let contents: Vec<_> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4", "m5", "new"]);
    }

    #[test]
    fn test_unsettled_rows_are_excluded() {
        let conv = ConversationId::new();
        let mut aborted = Message::assistant(conv, "partial ans");
        aborted.state = CompletionState::Aborted;
        let mut incomplete = Message::assistant_placeholder(conv);
        incomplete.content = "still going".to_string();
        incomplete.state = CompletionState::Incomplete;

        let history = vec![
            settled(conv, MessageRole::User, "question"),
            aborted,
            incomplete,
            settled(conv, MessageRole::Assistant, "settled answer"),
        ];
        let ctx = assembler(10).assemble_from_history(&history, Mode::Chat, None, "follow-up");

        let contents: Vec<_> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["question", "settled answer", "follow-up"]);
    }

    #[test]
    fn test_meta_instruction_is_appended_to_system() {
        let d = directive::parse("#calendar lunch tomorrow").unwrap();
        let ctx =
            assembler(10).assemble_from_history(&[], Mode::Chat, Some(&d), "#calendar lunch tomorrow");

        let base = ModeRegistry::with_locale("en")
            .system_prompt(Mode::Chat)
            .to_string();
        assert!(ctx.system.starts_with(&base));
        assert!(ctx.system.contains("'#calendar' directive"));
        assert!(ctx.system.contains("lunch tomorrow"));
    }

    #[test]
    fn test_meta_instruction_uses_canonical_keyword() {
        let d = directive::parse("#agenda standup").unwrap();
        let ctx = assembler(10).assemble_from_history(&[], Mode::Chat, Some(&d), "#agenda standup");
        assert!(ctx.system.contains("'#calendar' directive"));
    }

    #[tokio::test]
    async fn test_assemble_reads_gateway_history() {
        let store = MemoryStore::new();
        let conv = store
            .create_conversation(Conversation::new(UserId::new(), Mode::Chat, None))
            .await
            .unwrap();
        store
            .append_message(Message::user(conv.id, "hi"))
            .await
            .unwrap();
        store
            .append_message(Message::assistant(conv.id, "hello!"))
            .await
            .unwrap();

        let ctx = assembler(10)
            .assemble(&store, conv.id, Mode::Chat, None, "how are you?")
            .await
            .unwrap();

        let contents: Vec<_> = ctx.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello!", "how are you?"]);
    }
}
