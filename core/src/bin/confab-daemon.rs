//! Confab Daemon
//!
//! Headless chat loop over the orchestration core: reads user messages
//! from stdin, streams assistant responses to stdout. Useful for smoke
//! testing the pipeline without any presentation layer.
//!
//! # Usage
//!
//! ```bash
//! # Requires an API key
//! ANTHROPIC_API_KEY=sk-ant-... confab-daemon
//!
//! # With verbose logging
//! RUST_LOG=debug confab-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `ANTHROPIC_API_KEY` / `CONFAB_API_KEY`: provider API key (required)
//! - `CONFAB_MODEL`: model identifier
//! - `CONFAB_LOCALE`: mode-prompt locale (`en`, `nl`)
//! - `CONFAB_BASE_URL`: provider endpoint override
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! Configuration file: `~/.config/confab/confab.toml` (see
//! [`confab_core::config`]).

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use confab_core::{
    AnthropicProvider, ChatProvider, ChatService, CoreError, MemoryStore, StreamChunk, UserId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = confab_core::load_config()?;
    let Some(api_key) = config.api_key.clone() else {
        anyhow::bail!("no API key configured; set ANTHROPIC_API_KEY or CONFAB_API_KEY");
    };

    let provider = Arc::new(AnthropicProvider::with_base_url(api_key, &config.base_url));
    if !provider.health_check().await {
        warn!("Provider endpoint not reachable; the first request may fail");
    }
    let model = config.model.clone();
    let service = ChatService::new(Arc::new(MemoryStore::new()), provider, config);

    let owner = UserId::new();
    let conversation = service.create_conversation(owner, None, None).await?;
    info!(conversation = %conversation.id, model = %model, "Daemon ready; type a message, Ctrl-D to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            print_prompt();
            continue;
        }

        match service.send_message_stream(conversation.id, owner, text).await {
            Ok(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        StreamChunk::Delta(delta) => {
                            print!("{delta}");
                            let _ = std::io::stdout().flush();
                        }
                        StreamChunk::Done { .. } => println!(),
                        StreamChunk::Failed { error, .. } => {
                            println!();
                            warn!(%error, "Generation failed");
                        }
                    }
                }
            }
            Err(CoreError::Busy(_)) => warn!("Previous generation still running"),
            Err(e) => warn!(error = %e, "Send failed"),
        }

        print_prompt();
    }

    info!("Stdin closed, shutting down");
    Ok(())
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
