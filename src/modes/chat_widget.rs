use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    models::{ConversationState, Message},
    services::{
        prompts::QUICK_PROMPTS,
        session::{Completion, ConversationSession, SessionObserver},
        transport::StreamTransport,
    },
};

/// Persistent multi-turn chat widget
///
/// History survives open/close toggles for the lifetime of the widget.
/// Replies stream in the background; render from [`ChatWidget::subscribe`]
/// or [`ChatWidget::messages`].
pub struct ChatWidget {
    session: ConversationSession,
    open: bool,
}

impl ChatWidget {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self::with_session(ConversationSession::new(transport))
    }

    /// Widget that also reports session events to `observer`
    pub fn with_observer(
        transport: Arc<dyn StreamTransport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self::with_session(ConversationSession::builder(transport).observer(observer).build())
    }

    fn with_session(session: ConversationSession) -> Self {
        Self {
            session,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    /// True while a reply is streaming; input should be disabled
    pub fn is_loading(&self) -> bool {
        self.session.is_pending()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.session.snapshot().messages
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.session.subscribe()
    }

    /// Starter prompts, offered only until the first exchange
    pub fn quick_prompts(&self) -> &'static [&'static str] {
        if self.session.snapshot().messages.len() <= 1 {
            &QUICK_PROMPTS
        } else {
            &[]
        }
    }

    /// Send typed text
    ///
    /// Blank text and text sent while a reply is streaming are ignored and
    /// yield `None`. The returned completion may be dropped; the reply keeps
    /// streaming into the widget.
    pub fn send(&self, text: &str) -> Option<Completion> {
        match self.session.submit(text) {
            Ok(completion) => Some(completion),
            Err(rejection) => {
                tracing::debug!(reason = %rejection, "Chat widget ignored input");
                None
            }
        }
    }

    /// Send the quick prompt at `index`, same as typing it
    pub fn choose_prompt(&self, index: usize) -> Option<Completion> {
        let prompt = QUICK_PROMPTS.get(index)?;
        self.send(prompt)
    }
}
