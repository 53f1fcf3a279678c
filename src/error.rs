use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures of a single streamed exchange with the language-model backend
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("malformed stream data: {0}")]
    Decode(String),

    #[error("invalid conversation history: {0}")]
    InvalidHistory(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => TransportError::Request(err.to_string()),
        }
    }
}

/// Reasons a conversation session refuses or loses a submission
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Submitted text was empty or whitespace only
    #[error("message is empty")]
    EmptyInput,

    /// A reply is still streaming for this session
    #[error("a reply is already in progress")]
    Busy,

    /// The task driving the stream stopped before reaching a terminal state
    #[error("reply task interrupted: {0}")]
    Interrupted(String),
}

/// Errors surfaced by a one-shot search
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Rejected(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Rejected(SessionError::EmptyInput) => {
                AppError::InvalidInput("Search query cannot be empty".to_string())
            }
            SearchError::Rejected(SessionError::Busy) => {
                AppError::Conflict(SessionError::Busy.to_string())
            }
            SearchError::Rejected(SessionError::Interrupted(msg)) => AppError::Internal(msg),
            SearchError::Transport(e) => AppError::Transport(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Transport(TransportError::InvalidHistory(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Transport(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_search_maps_to_bad_request() {
        let err: AppError = SearchError::Rejected(SessionError::EmptyInput).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_transport_failure_maps_to_bad_gateway() {
        let err: AppError = SearchError::Transport(TransportError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_history_is_client_error() {
        let err = AppError::Transport(TransportError::InvalidHistory("empty".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_error_keeps_backend_body() {
        let err = TransportError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "backend returned status 429: rate limited");
    }
}
