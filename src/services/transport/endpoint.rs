/// Transport that goes through the `/api/chat` endpoint
///
/// The endpoint owns the system directive, so only the caller's history is
/// posted. The response body is plain text; every decoded body chunk becomes
/// one fragment.
use futures::{future, stream, StreamExt};
use reqwest::Client as HttpClient;
use serde::Serialize;

use super::{utf8::Utf8Decoder, validate_history, FragmentStream, StreamTransport};
use crate::{error::TransportError, models::ChatMessage};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Clone)]
pub struct EndpointTransport {
    http_client: HttpClient,
    endpoint_url: String,
}

impl EndpointTransport {
    /// `endpoint_url` is the full URL of the chat route, e.g. `http://localhost:3000/api/chat`
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            endpoint_url: endpoint_url.into(),
        }
    }
}

/// Best-available diagnostic from an error response body
///
/// The endpoint answers failures with `{"error": "..."}`; anything else is
/// passed through as-is.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait::async_trait]
impl StreamTransport for EndpointTransport {
    async fn open(&self, history: &[ChatMessage]) -> Result<FragmentStream, TransportError> {
        validate_history(history)?;

        tracing::debug!(
            endpoint = %self.endpoint_url,
            message_count = history.len(),
            "Posting conversation to chat endpoint"
        );

        let response = self
            .http_client
            .post(&self.endpoint_url)
            .json(&ChatRequest { messages: history })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_detail(&body),
            });
        }

        let fragments = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .scan(Utf8Decoder::default(), |decoder, chunk| {
                future::ready(Some(match chunk {
                    Some(Ok(bytes)) => Ok(decoder.push(&bytes)),
                    Some(Err(e)) => Err(TransportError::Stream(e.to_string())),
                    None if decoder.has_pending() => Err(TransportError::Decode(
                        "body ended inside a UTF-8 sequence".to_string(),
                    )),
                    None => Ok(String::new()),
                }))
            })
            .filter(|fragment| future::ready(!matches!(fragment, Ok(text) if text.is_empty())));

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &'static str {
        "endpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::StatusCode,
        routing::post,
        Json, Router,
    };
    use bytes::Bytes;
    use serde_json::{json, Value};

    async fn spawn_endpoint(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/chat", addr)
    }

    #[test]
    fn test_error_detail_prefers_json_error() {
        assert_eq!(error_detail(r#"{"error":"bad history"}"#), "bad history");
        assert_eq!(error_detail("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn test_streams_body_and_echoes_history() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let count = body["messages"].as_array().map(Vec::len).unwrap_or(0);
                let bytes = "• Heat".as_bytes().to_vec();
                let chunks = vec![
                    Bytes::from(format!("{} messages\n", count)),
                    Bytes::from(bytes[..2].to_vec()),
                    Bytes::from(bytes[2..].to_vec()),
                ];
                Body::from_stream(stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>)))
            }),
        );
        let url = spawn_endpoint(app).await;

        let history = vec![ChatMessage::assistant("Hi!"), ChatMessage::user("picks?")];
        let stream = EndpointTransport::new(url).open(&history).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert!(fragments.iter().all(|f| !f.is_empty()));
        assert_eq!(fragments.concat(), "2 messages\n• Heat");
    }

    #[tokio::test]
    async fn test_truncated_character_is_decode_error() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                let bytes = "Top pick •".as_bytes();
                Body::from(bytes[..bytes.len() - 1].to_vec())
            }),
        );
        let url = spawn_endpoint(app).await;

        let stream = EndpointTransport::new(url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let items: Vec<Result<String, TransportError>> = stream.collect().await;

        let (last, fragments) = items.split_last().unwrap();
        let text: String = fragments.iter().map(|f| f.as_ref().unwrap().as_str()).collect();
        assert_eq!(text, "Top pick ");
        assert!(matches!(last, Err(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_error_status_carries_diagnostic() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "backend unreachable" })),
                )
            }),
        );
        let url = spawn_endpoint(app).await;

        let result = EndpointTransport::new(url)
            .open(&[ChatMessage::user("anything")])
            .await;

        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "backend unreachable");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = EndpointTransport::new(format!("http://{}/api/chat", addr))
            .open(&[ChatMessage::user("anything")])
            .await;

        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
