mod conversation;
mod message;
mod search;

pub use conversation::{ConversationState, SessionStatus};
pub use message::{ChatMessage, Message, MessageStatus, Role};
pub use search::{SearchResultPayload, SuggestionList};
