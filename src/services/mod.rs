pub mod prompts;
pub mod session;
pub mod suggestions;
pub mod transport;

pub use session::{Completion, ConversationSession, Outcome, SessionObserver};
pub use transport::{CompletionTransport, EndpointTransport, StreamTransport};
