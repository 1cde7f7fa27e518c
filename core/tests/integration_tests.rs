//! Integration tests for the conversation orchestration pipeline
//!
//! These tests drive the public `ChatService` surface end to end with a
//! scripted provider and verify the behavior a presentation layer relies
//! on: directive routing, mode persistence, prompt assembly, blocking vs
//! streaming parity, and the CRUD surface.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use confab_core::{
    ChatProvider, ChatService, CompletionState, CoreConfig, CoreError, ListFilter, MemoryStore,
    Mode, ModeRegistry, Page, ProviderEvent, ProviderReply, ProviderRequest, StreamChunk, UserId,
};

// =============================================================================
// Scripted Provider
// =============================================================================

/// Provider that records every request and replays optional scripts.
///
/// Without a script, it echoes the latest user message (`re: <text>`) so
/// blocking and streaming calls produce identical content.
struct ScriptedProvider {
    requests: Mutex<Vec<ProviderRequest>>,
    scripts: Mutex<VecDeque<Vec<ProviderEvent>>>,
}

impl ScriptedProvider {
    fn echo() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
        }
    }

    fn with_scripts(scripts: Vec<Vec<ProviderEvent>>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            scripts: Mutex::new(scripts.into()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ProviderRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }

    fn next_script(&self) -> Option<Vec<ProviderEvent>> {
        self.scripts.lock().unwrap().pop_front()
    }

    fn echo_text(request: &ProviderRequest) -> String {
        format!(
            "re: {}",
            request.messages.last().map_or("", |m| m.content.as_str())
        )
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn complete(&self, request: &ProviderRequest) -> anyhow::Result<ProviderReply> {
        self.record(request);
        let text = match self.next_script() {
            Some(events) => {
                let mut text = String::new();
                for event in events {
                    match event {
                        ProviderEvent::Delta(t) => text.push_str(&t),
                        ProviderEvent::Done { text: t } if !t.is_empty() => text = t,
                        ProviderEvent::Done { .. } => {}
                        ProviderEvent::Error(e) => anyhow::bail!(e),
                    }
                }
                text
            }
            None => Self::echo_text(request),
        };
        Ok(ProviderReply {
            text,
            model: request.model.clone(),
            tokens_used: None,
            duration_ms: None,
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>> {
        self.record(request);
        let events = self.next_script().unwrap_or_else(|| {
            let text = Self::echo_text(request);
            vec![
                ProviderEvent::Delta(text.clone()),
                ProviderEvent::Done { text },
            ]
        });

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

fn service_with(
    provider: Arc<ScriptedProvider>,
    config: CoreConfig,
) -> ChatService<ScriptedProvider> {
    ChatService::new(Arc::new(MemoryStore::new()), provider, config)
}

fn echo_service() -> (ChatService<ScriptedProvider>, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::echo());
    (
        service_with(Arc::clone(&provider), CoreConfig::default()),
        provider,
    )
}

async fn drain(
    mut stream: tokio_stream::wrappers::ReceiverStream<StreamChunk>,
) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }
    chunks
}

// =============================================================================
// Directive Routing and Mode Persistence
// =============================================================================

#[tokio::test]
async fn test_note_directive_switches_mode_and_prompt() {
    let (service, provider) = echo_service();
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();
    assert_eq!(conv.mode, Mode::Chat);

    // The switching turn itself already runs under the note prompt
    service
        .send_message(conv.id, owner, "#note buy milk")
        .await
        .unwrap();

    let (conversation, _) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(conversation.mode, Mode::Note, "mode switch persisted");

    // The subsequent turn keeps the note template
    service
        .send_message(conv.id, owner, "anything else?")
        .await
        .unwrap();

    let registry = ModeRegistry::with_locale("en");
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].system, registry.system_prompt(Mode::Note));
    assert_eq!(requests[1].system, registry.system_prompt(Mode::Note));
}

#[tokio::test]
async fn test_help_directive_keeps_mode_and_adds_meta() {
    let (service, provider) = echo_service();
    let owner = UserId::new();
    let conv = service
        .create_conversation(owner, Some(Mode::Note), None)
        .await
        .unwrap();

    service.send_message(conv.id, owner, "#help").await.unwrap();

    let (conversation, _) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(conversation.mode, Mode::Note, "no persisted mode change");

    let requests = provider.requests();
    let registry = ModeRegistry::with_locale("en");
    assert!(requests[0]
        .system
        .starts_with(registry.system_prompt(Mode::Note)));
    assert!(requests[0].system.contains("'#help' directive"));
}

#[tokio::test]
async fn test_unrecognized_keyword_never_alters_mode() {
    let (service, provider) = echo_service();
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    service
        .send_message(conv.id, owner, "#frobnicate the widgets")
        .await
        .unwrap();

    let (conversation, _) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(conversation.mode, Mode::Chat);
    assert!(provider.requests()[0]
        .system
        .contains("'#frobnicate' directive"));
}

#[tokio::test]
async fn test_calendar_directive_is_meta_instruction() {
    let (service, provider) = echo_service();
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    service
        .send_message(conv.id, owner, "#calendar lunch with Jan at 14:00")
        .await
        .unwrap();

    let (conversation, messages) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(conversation.mode, Mode::Chat, "calendar never switches mode");
    assert_eq!(messages[0].metadata.directive.as_deref(), Some("calendar"));

    let system = &provider.requests()[0].system;
    assert!(system.contains("'#calendar' directive"));
    assert!(system.contains("lunch with Jan at 14:00"));
}

#[tokio::test]
async fn test_plain_text_runs_under_existing_mode() {
    let (service, provider) = echo_service();
    let owner = UserId::new();
    let conv = service
        .create_conversation(owner, Some(Mode::Scan), None)
        .await
        .unwrap();

    service
        .send_message(conv.id, owner, "what is on this receipt?")
        .await
        .unwrap();

    let registry = ModeRegistry::with_locale("en");
    assert_eq!(
        provider.requests()[0].system,
        registry.system_prompt(Mode::Scan)
    );
}

// =============================================================================
// Prompt Assembly
// =============================================================================

#[tokio::test]
async fn test_context_is_bounded_with_oldest_first_truncation() {
    let provider = Arc::new(ScriptedProvider::echo());
    let config = CoreConfig {
        max_context_messages: 2,
        ..CoreConfig::default()
    };
    let service = service_with(Arc::clone(&provider), config);
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    for text in ["one", "two", "three"] {
        service.send_message(conv.id, owner, text).await.unwrap();
    }

    // Third turn: 4 settled history rows exist, only the latest 2 plus the
    // new message go upstream.
    let request = provider.requests().pop().unwrap();
    let contents: Vec<String> = request.messages.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents, vec!["two", "re: two", "three"]);
}

#[tokio::test]
async fn test_aborted_content_is_excluded_from_later_context() {
    let provider = Arc::new(ScriptedProvider::with_scripts(vec![vec![
        ProviderEvent::Delta("SECRET-PARTIAL ".to_string()),
        ProviderEvent::Error("connection reset".to_string()),
    ]]));
    let service = service_with(Arc::clone(&provider), CoreConfig::default());
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    // First turn fails mid-stream and leaves an aborted row
    let stream = service
        .send_message_stream(conv.id, owner, "first question")
        .await
        .unwrap();
    let mut chunks = drain(stream).await;
    let terminal = chunks.pop().unwrap();
    assert!(matches!(terminal, StreamChunk::Failed { .. }));
    assert!(matches!(
        terminal.into_result(),
        Err(CoreError::StreamAborted(ref reason)) if reason == "connection reset"
    ));

    let (_, messages) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(messages[1].state, CompletionState::Aborted);
    assert_eq!(messages[1].content, "SECRET-PARTIAL ");

    // Second turn: the aborted content must not reach the provider
    service
        .send_message(conv.id, owner, "second question")
        .await
        .unwrap();

    let request = provider.requests().pop().unwrap();
    let combined: String = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(!combined.contains("SECRET-PARTIAL"));
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first question", "second question"]);
}

// =============================================================================
// Blocking vs Streaming Parity
// =============================================================================

#[tokio::test]
async fn test_blocking_and_streaming_persist_identical_content() {
    let (service, _) = echo_service();
    let owner = UserId::new();

    let blocking = service.create_conversation(owner, None, None).await.unwrap();
    let streaming = service.create_conversation(owner, None, None).await.unwrap();

    let reply = service
        .send_message(blocking.id, owner, "same question")
        .await
        .unwrap();

    let stream = service
        .send_message_stream(streaming.id, owner, "same question")
        .await
        .unwrap();
    let chunks = drain(stream).await;

    let Some(StreamChunk::Done { message }) = chunks.last() else {
        panic!("expected Done terminal chunk");
    };
    assert_eq!(reply.content, message.content, "byte-identical content");
    assert_eq!(message.state, CompletionState::Complete);

    // And the delivered deltas concatenate to the same bytes
    let delivered: String = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Delta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, reply.content);
}

#[tokio::test]
async fn test_stream_yields_deltas_then_exactly_one_terminal() {
    let provider = Arc::new(ScriptedProvider::with_scripts(vec![vec![
        ProviderEvent::Delta("a".to_string()),
        ProviderEvent::Delta("b".to_string()),
        ProviderEvent::Delta("c".to_string()),
        ProviderEvent::Done {
            text: "abc".to_string(),
        },
    ]]));
    let service = service_with(Arc::clone(&provider), CoreConfig::default());
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    let stream = service
        .send_message_stream(conv.id, owner, "spell it")
        .await
        .unwrap();
    let chunks = drain(stream).await;

    let terminals = chunks.iter().filter(|c| c.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(chunks.last().unwrap().is_terminal());
    let deltas: Vec<&str> = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Delta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["a", "b", "c"]);
}

// =============================================================================
// Provider Failure Propagation
// =============================================================================

#[tokio::test]
async fn test_blocking_failure_leaves_only_user_message() {
    let provider = Arc::new(ScriptedProvider::with_scripts(vec![
        vec![ProviderEvent::Error("upstream down".to_string())],
        vec![ProviderEvent::Error("upstream still down".to_string())],
    ]));
    let service = service_with(Arc::clone(&provider), CoreConfig {
        retry_backoff_ms: 1,
        ..CoreConfig::default()
    });
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    let result = service.send_message(conv.id, owner, "hello?").await;
    assert!(matches!(result, Err(CoreError::Provider(_))));

    // One retry was spent, and no assistant row was created
    assert_eq!(provider.requests().len(), 2);
    let (_, messages) = service.get_conversation(conv.id, owner).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hello?");
}

// =============================================================================
// CRUD Surface
// =============================================================================

#[tokio::test]
async fn test_listing_is_most_recent_first_with_mode_filter() {
    let (service, _) = echo_service();
    let owner = UserId::new();

    let chat = service.create_conversation(owner, None, None).await.unwrap();
    let note = service
        .create_conversation(owner, Some(Mode::Note), Some("Notes".to_string()))
        .await
        .unwrap();

    // Touch the chat conversation so it becomes the most recent
    service.send_message(chat.id, owner, "bump").await.unwrap();

    let listed = service
        .list_conversations(owner, ListFilter::default())
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![chat.id, note.id]);

    let notes_only = service
        .list_conversations(
            owner,
            ListFilter {
                mode: Some(Mode::Note),
                page: Page::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(notes_only.len(), 1);
    assert_eq!(notes_only[0].title, "Notes");
}

#[tokio::test]
async fn test_message_pagination() {
    let (service, _) = echo_service();
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    for text in ["a", "b", "c"] {
        service.send_message(conv.id, owner, text).await.unwrap();
    }

    let window = service
        .messages(conv.id, owner, Page { limit: 2, offset: 1 })
        .await
        .unwrap();
    let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["re: a", "b"]);
}

#[tokio::test]
async fn test_delete_cascades_and_forbids_strangers() {
    let (service, _) = echo_service();
    let owner = UserId::new();
    let stranger = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();
    service.send_message(conv.id, owner, "hello").await.unwrap();

    assert!(matches!(
        service.delete_conversation(conv.id, stranger).await,
        Err(CoreError::Forbidden(_))
    ));

    service.delete_conversation(conv.id, owner).await.unwrap();
    assert!(matches!(
        service.get_conversation(conv.id, owner).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(
        service.send_message(conv.id, owner, "ghost").await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_dutch_locale_prompts() {
    let provider = Arc::new(ScriptedProvider::echo());
    let config = CoreConfig {
        locale: "nl".to_string(),
        ..CoreConfig::default()
    };
    let service = service_with(Arc::clone(&provider), config);
    let owner = UserId::new();
    let conv = service.create_conversation(owner, None, None).await.unwrap();

    service.send_message(conv.id, owner, "hallo").await.unwrap();

    let registry = ModeRegistry::with_locale("nl");
    assert_eq!(
        provider.requests()[0].system,
        registry.system_prompt(Mode::Chat)
    );
}
