//! Conversation session: the state machine behind both presentation modes.
//!
//! A session owns one [`ConversationState`] and moves between
//! [`SessionStatus::Idle`], [`SessionStatus::Streaming`] and
//! [`SessionStatus::Error`]:
//!
//! - `submit` from Idle or Error appends a user message and an empty
//!   streaming assistant message, then enters Streaming.
//! - every fragment is appended to the trailing assistant message in arrival
//!   order.
//! - end of stream marks the message complete and returns to Idle.
//! - a transport failure replaces the message content with a notice, marks
//!   it complete and enters Error.
//! - `reset` returns to Idle with only the greeting.
//!
//! Only one request is in flight per session. A `submit` while Streaming is
//! rejected and nothing is queued or cancelled.
//!
//! State snapshots are published on a `watch` channel for presentation
//! layers; [`SessionObserver`]s additionally see every intermediate update in
//! order.

use futures::{FutureExt, StreamExt};
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    error::{SessionError, TransportError},
    models::{ChatMessage, ConversationState, Message, MessageStatus, SessionStatus},
    services::{prompts, transport::StreamTransport},
};

/// Synchronous hooks into a session's lifecycle
///
/// Callbacks run on the task driving the stream, right after the state they
/// describe was published. A callback that panics fails the submission: the
/// reply is settled with the error notice and the completion resolves to
/// [`SessionError::Interrupted`].
pub trait SessionObserver: Send + Sync {
    /// Any change to the conversation state
    fn on_update(&self, _state: &ConversationState) {}

    /// A reply finished streaming
    fn on_complete(&self, _message: &Message) {}

    /// A reply failed; the session already shows the error notice
    fn on_error(&self, _error: &TransportError) {}
}

/// Terminal result of one accepted submission
#[derive(Debug)]
pub enum Outcome {
    /// The reply streamed to the end
    Completed(Message),
    /// The transport failed; `notice` is the message shown in its place
    Failed {
        notice: Message,
        error: TransportError,
    },
    /// The session was reset while the reply was streaming
    Discarded,
}

impl Outcome {
    /// The completed reply, if any
    pub fn reply(&self) -> Option<&Message> {
        match self {
            Outcome::Completed(message) => Some(message),
            _ => None,
        }
    }
}

/// Handle to an accepted submission
///
/// Await it to get the [`Outcome`]; drop it to let the reply finish in the
/// background. Dropping never cancels the stream.
#[must_use = "await the completion or drop it explicitly to run in the background"]
pub struct Completion {
    handle: JoinHandle<Outcome>,
}

impl Future for Completion {
    type Output = Result<Outcome, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.handle
            .poll_unpin(cx)
            .map(|joined| joined.map_err(|e| SessionError::Interrupted(e.to_string())))
    }
}

/// Builder for [`ConversationSession`]
pub struct SessionBuilder {
    transport: Arc<dyn StreamTransport>,
    greeting: Option<String>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl SessionBuilder {
    /// Greeting used for the initial state and by `reset`; `None` starts empty
    pub fn greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> ConversationSession {
        let (state, _) = watch::channel(ConversationState::new(self.greeting.as_deref()));
        ConversationSession {
            inner: Arc::new(SessionInner {
                transport: self.transport,
                greeting: self.greeting,
                observers: self.observers,
                state,
            }),
        }
    }
}

/// Owner of one logical multi-turn exchange
///
/// Cloning yields another handle to the same session. Independently built
/// sessions share nothing.
#[derive(Clone)]
pub struct ConversationSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Arc<dyn StreamTransport>,
    greeting: Option<String>,
    observers: Vec<Arc<dyn SessionObserver>>,
    state: watch::Sender<ConversationState>,
}

impl ConversationSession {
    /// Session seeded with the default greeting
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn StreamTransport>) -> SessionBuilder {
        SessionBuilder {
            transport,
            greeting: Some(prompts::GREETING.to_string()),
            observers: Vec::new(),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> ConversationState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that sees the latest state after every change
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.inner.state.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().is_pending()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    /// Submit user text and start streaming the reply
    ///
    /// Blank text is rejected with [`SessionError::EmptyInput`] and text
    /// submitted while a reply is streaming with [`SessionError::Busy`]; in
    /// both cases nothing changes and no request is made. Must be called
    /// within a tokio runtime.
    pub fn submit(&self, text: &str) -> Result<Completion, SessionError> {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring empty submission");
            return Err(SessionError::EmptyInput);
        }

        let mut accepted = None;
        self.inner.publish(|state| {
            if state.is_pending() {
                return false;
            }
            state.messages.push(Message::user(text));
            let history = state.history();
            let placeholder = Message::streaming_assistant();
            accepted = Some((history, placeholder.id));
            state.messages.push(placeholder);
            state.status = SessionStatus::Streaming;
            true
        });

        let Some((history, reply_id)) = accepted else {
            tracing::debug!("Ignoring submission while a reply is streaming");
            return Err(SessionError::Busy);
        };

        tracing::info!(message_count = history.len(), "Submitted message");

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(inner.drive(history, reply_id))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    tracing::error!(%reply_id, "Reply task panicked, settling with error notice");
                    inner.state.send_if_modified(|state| {
                        settle_reply(state, reply_id, Some(prompts::ERROR_NOTICE)).is_some()
                    });
                    std::panic::resume_unwind(panic)
                }
            }
        });
        Ok(Completion { handle })
    }

    /// Clear history back to the greeting and return to Idle
    ///
    /// A reply still streaming is orphaned: its remaining fragments and its
    /// terminal state are discarded.
    pub fn reset(&self) {
        let greeting = self.inner.greeting.as_deref();
        self.inner.publish(|state| {
            *state = ConversationState::new(greeting);
            true
        });
    }
}

impl SessionInner {
    async fn drive(&self, history: Vec<ChatMessage>, reply_id: Uuid) -> Outcome {
        let mut fragments = match self.transport.open(&history).await {
            Ok(fragments) => fragments,
            Err(error) => return self.fail(reply_id, error),
        };

        let mut fragment_count = 0usize;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => {
                    if !self.append(reply_id, &text) {
                        tracing::debug!(%reply_id, "Reply orphaned by reset, dropping stream");
                        return Outcome::Discarded;
                    }
                    fragment_count += 1;
                }
                Err(error) => return self.fail(reply_id, error),
            }
        }

        self.finish(reply_id, fragment_count)
    }

    /// Appends to the reply if it is still the streaming trailing message
    fn append(&self, reply_id: Uuid, text: &str) -> bool {
        let mut owned = false;
        self.publish(|state| {
            match state.messages.last_mut() {
                Some(reply) if reply.id == reply_id && reply.is_streaming() => {
                    owned = true;
                    if text.is_empty() {
                        return false;
                    }
                    reply.content.push_str(text);
                    true
                }
                _ => false,
            }
        });
        owned
    }

    /// Moves the reply to a terminal state; `None` if it was orphaned
    fn settle(&self, reply_id: Uuid, notice: Option<&str>) -> Option<Message> {
        let mut settled = None;
        self.publish(|state| {
            settled = settle_reply(state, reply_id, notice);
            settled.is_some()
        });
        settled
    }

    fn finish(&self, reply_id: Uuid, fragment_count: usize) -> Outcome {
        let Some(reply) = self.settle(reply_id, None) else {
            return Outcome::Discarded;
        };

        tracing::info!(
            fragments = fragment_count,
            reply_len = reply.content.len(),
            "Reply completed"
        );
        for observer in &self.observers {
            observer.on_complete(&reply);
        }
        Outcome::Completed(reply)
    }

    fn fail(&self, reply_id: Uuid, error: TransportError) -> Outcome {
        tracing::error!(error = %error, transport = self.transport.name(), "Reply stream failed");

        let Some(notice) = self.settle(reply_id, Some(prompts::ERROR_NOTICE)) else {
            return Outcome::Discarded;
        };

        for observer in &self.observers {
            observer.on_error(&error);
        }
        Outcome::Failed { notice, error }
    }

    /// Applies `update` and hands observers the state it produced
    ///
    /// The snapshot is taken under the same write, so a concurrent `reset`
    /// cannot make observers see another writer's state for this update.
    fn publish(&self, update: impl FnOnce(&mut ConversationState) -> bool) -> bool {
        let mut snapshot = None;
        let modified = self.state.send_if_modified(|state| {
            if !update(state) {
                return false;
            }
            if !self.observers.is_empty() {
                snapshot = Some(state.clone());
            }
            true
        });
        if let Some(snapshot) = snapshot {
            for observer in &self.observers {
                observer.on_update(&snapshot);
            }
        }
        modified
    }
}

/// Marks the trailing reply complete if it is still `reply_id` and streaming
///
/// With a `notice` the content is replaced and the session enters Error.
fn settle_reply(
    state: &mut ConversationState,
    reply_id: Uuid,
    notice: Option<&str>,
) -> Option<Message> {
    let reply = state
        .messages
        .last_mut()
        .filter(|m| m.id == reply_id && m.is_streaming())?;
    if let Some(notice) = notice {
        reply.content = notice.to_string();
    }
    reply.status = MessageStatus::Complete;
    let settled = reply.clone();
    state.status = if notice.is_some() {
        SessionStatus::Error
    } else {
        SessionStatus::Idle
    };
    Some(settled)
}
