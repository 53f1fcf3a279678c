use std::sync::Arc;

use crate::{
    error::{SearchError, SessionError},
    models::SearchResultPayload,
    services::{
        prompts,
        session::{ConversationSession, Outcome},
        suggestions,
        transport::StreamTransport,
    },
};

type ResultsCallback = Box<dyn Fn(&SearchResultPayload) + Send + Sync>;

/// One-shot "search to results" bar
///
/// Every search runs on a freshly reset session without a greeting, so the
/// backend always receives a single user message. The finished reply is
/// turned into a [`SearchResultPayload`] and handed to the host page.
pub struct SearchBar {
    session: ConversationSession,
    last_query: Option<String>,
    last_result: Option<SearchResultPayload>,
    on_results: Option<ResultsCallback>,
}

impl SearchBar {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            session: ConversationSession::builder(transport)
                .greeting(None)
                .build(),
            last_query: None,
            last_result: None,
            on_results: None,
        }
    }

    /// Registers the host page callback invoked with every completed result
    pub fn on_results<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SearchResultPayload) + Send + Sync + 'static,
    {
        self.on_results = Some(Box::new(callback));
        self
    }

    /// Last submitted query
    pub fn query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    /// Result currently shown, until dismissed or superseded
    pub fn result(&self) -> Option<&SearchResultPayload> {
        self.last_result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_pending()
    }

    /// Dismiss the current result
    pub fn dismiss(&mut self) {
        self.last_result = None;
    }

    /// Ask the assistant for recommendations matching `query`
    ///
    /// Blank queries are rejected before any request. A transport failure is
    /// returned as [`SearchError::Transport`] and no payload is emitted.
    pub async fn search(&mut self, query: &str) -> Result<SearchResultPayload, SearchError> {
        if query.trim().is_empty() {
            return Err(SessionError::EmptyInput.into());
        }
        if self.session.is_pending() {
            return Err(SessionError::Busy.into());
        }

        self.last_query = Some(query.to_string());
        self.last_result = None;
        self.session.reset();

        let outcome = self.session.submit(&prompts::search_prompt(query))?.await?;

        match outcome {
            Outcome::Completed(reply) => {
                let payload = SearchResultPayload {
                    query: query.to_string(),
                    suggestions: suggestions::extract(&reply.content),
                    response: reply.content,
                };
                tracing::info!(
                    query = %query,
                    suggestions = payload.suggestions.len(),
                    "AI search completed"
                );
                if let Some(callback) = &self.on_results {
                    callback(&payload);
                }
                self.last_result = Some(payload.clone());
                Ok(payload)
            }
            Outcome::Failed { error, .. } => {
                tracing::warn!(query = %query, error = %error, "AI search failed");
                Err(error.into())
            }
            Outcome::Discarded => Err(SessionError::Interrupted(
                "search session was reset".to_string(),
            )
            .into()),
        }
    }
}
