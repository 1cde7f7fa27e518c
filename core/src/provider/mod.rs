//! AI Provider Integration
//!
//! Abstracted access to the external AI provider through a common trait
//! interface. The core consumes one capability set (a blocking completion
//! and an incrementally-delivered stream), so both paths share the same
//! retry, timeout, and finalization logic upstream in the orchestrator.
//!
//! # Usage
//!
//! ```ignore
//! use confab_core::provider::{AnthropicProvider, ChatProvider, ProviderRequest};
//!
//! let provider = AnthropicProvider::new(api_key);
//! let request = ProviderRequest::new("claude-3-haiku-20240307", context);
//! let rx = provider.stream(&request).await?;
//! ```

mod anthropic;
mod traits;

pub use anthropic::AnthropicProvider;
pub use traits::{ChatProvider, ProviderEvent, ProviderReply, ProviderRequest};
