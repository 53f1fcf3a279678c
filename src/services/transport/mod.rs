/// Streaming transport abstraction
///
/// A transport turns one conversation history into one lazily streamed reply.
/// Two implementations exist: [`CompletionTransport`] talks to an
/// OpenAI-compatible chat-completions backend directly, and
/// [`EndpointTransport`] goes through this crate's own `/api/chat` route.
use futures::Stream;
use std::pin::Pin;

use crate::{
    error::TransportError,
    models::{ChatMessage, Role},
};

pub mod completion;
pub mod endpoint;
mod utf8;

pub use completion::CompletionTransport;
pub use endpoint::EndpointTransport;

/// Ordered text fragments of one reply
///
/// Concatenating every `Ok` item yields the full reply. The stream is finite
/// and cannot be restarted; retrying means opening a new one.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Trait for reply streaming backends
///
/// Implementations hold no per-conversation state; every call is an
/// independent network exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open one exchange for `history` and return its fragment stream
    ///
    /// Fails with [`TransportError::InvalidHistory`] before touching the
    /// network when `history` violates [`validate_history`].
    async fn open(&self, history: &[ChatMessage]) -> Result<FragmentStream, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// Checks the input constraint shared by every transport
///
/// History must be non-empty, contain at least one user message, and every
/// message must have non-blank content.
pub fn validate_history(history: &[ChatMessage]) -> Result<(), TransportError> {
    if history.is_empty() {
        return Err(TransportError::InvalidHistory(
            "conversation has no messages".to_string(),
        ));
    }

    if let Some(index) = history.iter().position(|m| m.content.trim().is_empty()) {
        return Err(TransportError::InvalidHistory(format!(
            "message {} has empty content",
            index
        )));
    }

    if !history.iter().any(|m| m.role == Role::User) {
        return Err(TransportError::InvalidHistory(
            "conversation has no user message".to_string(),
        ));
    }

    Ok(())
}
