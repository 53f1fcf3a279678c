use serde::{Deserialize, Serialize};

use super::{ChatMessage, Message};

/// Where a conversation session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Ready for a submission
    Idle,
    /// A reply is streaming into the trailing assistant message
    Streaming,
    /// The last reply failed; the session still accepts submissions
    Error,
}

/// Message history and status owned by one conversation session
///
/// At most one message is streaming, and when there is one it is the last
/// element of `messages` and `status` is [`SessionStatus::Streaming`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub status: SessionStatus,
}

impl ConversationState {
    /// Creates a state seeded with an optional assistant greeting
    pub fn new(greeting: Option<&str>) -> Self {
        Self {
            messages: greeting.map(Message::assistant).into_iter().collect(),
            status: SessionStatus::Idle,
        }
    }

    /// True while a request is in flight
    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Streaming
    }

    /// The trailing message if it is still streaming
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_streaming())
    }

    /// Wire history for the next request
    ///
    /// Streaming messages and messages with blank content are skipped.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming() && !m.content.trim().is_empty())
            .map(Message::to_chat)
            .collect()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(None)
    }
}
