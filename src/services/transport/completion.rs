/// OpenAI-compatible chat-completions transport (Groq by default)
///
/// Requests are sent with `stream: true` and the reply arrives as
/// Server-Sent Events. The fixed system directive is prepended to every
/// history; callers never include it themselves.
use futures::{future, stream, StreamExt};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::{utf8::Utf8Decoder, validate_history, FragmentStream, StreamTransport};
use crate::{
    config::Config,
    error::TransportError,
    models::ChatMessage,
    services::prompts::SYSTEM_DIRECTIVE,
};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// One decoded server-sent event
#[derive(Debug, PartialEq)]
enum SseEvent {
    Fragment(String),
    Done,
}

#[derive(Clone)]
pub struct CompletionTransport {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: Option<u32>,
    system_directive: String,
}

impl CompletionTransport {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            model,
            max_tokens: None,
            system_directive: SYSTEM_DIRECTIVE.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_api_key.clone(),
            config.llm_api_url.clone(),
            config.llm_model.clone(),
        )
        .with_max_tokens(config.llm_max_tokens)
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }

    fn build_request(&self, history: &[ChatMessage]) -> CompletionRequest<'_> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.system_directive.as_str()));
        messages.extend_from_slice(history);

        CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
            max_tokens: self.max_tokens,
        }
    }
}

/// Parse one complete SSE line
///
/// Returns `None` for blank lines, comments, other fields and chunks that
/// carry no text.
fn parse_sse_line(line: &str) -> Option<Result<SseEvent, TransportError>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        return Some(Ok(SseEvent::Done));
    }

    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(TransportError::Decode(e.to_string()))),
    };

    if let Some(error) = chunk.error {
        return Some(Err(TransportError::Stream(error.message)));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(|content| Ok(SseEvent::Fragment(content)))
}

/// Drain every complete `\n`-terminated line from `buf`
///
/// A trailing partial line stays in `buf` until the next chunk extends it.
fn drain_sse_lines(buf: &mut String) -> Vec<Result<SseEvent, TransportError>> {
    let mut events = Vec::new();
    while let Some(newline) = buf.find('\n') {
        let line: String = buf.drain(..=newline).collect();
        if let Some(event) = parse_sse_line(line.trim_end_matches(['\n', '\r'])) {
            events.push(event);
        }
    }
    events
}

/// Events for the end of the response body
///
/// A final line without a trailing newline is still parsed. A body that ends
/// before `[DONE]` was cut off and yields an error instead of a short reply.
fn end_of_body(decoder: &Utf8Decoder, buf: &mut String) -> Vec<Result<SseEvent, TransportError>> {
    if decoder.has_pending() {
        return vec![Err(TransportError::Decode(
            "body ended inside a UTF-8 sequence".to_string(),
        ))];
    }

    let tail = std::mem::take(buf);
    let mut events: Vec<_> = parse_sse_line(tail.trim_end_matches(['\n', '\r']))
        .into_iter()
        .collect();
    if !matches!(events.last(), Some(Ok(SseEvent::Done)) | Some(Err(_))) {
        events.push(Err(TransportError::Stream(format!(
            "stream ended before {DONE_SENTINEL}"
        ))));
    }
    events
}

#[async_trait::async_trait]
impl StreamTransport for CompletionTransport {
    async fn open(&self, history: &[ChatMessage]) -> Result<FragmentStream, TransportError> {
        validate_history(history)?;

        let request = self.build_request(history);
        tracing::debug!(
            model = %self.model,
            message_count = request.messages.len(),
            provider = self.name(),
            "Opening completion stream"
        );

        let response = self
            .http_client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, provider = self.name(), "Completion request rejected");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let fragments = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .scan(
                (Utf8Decoder::default(), String::new()),
                |(decoder, buf), chunk| {
                    let events = match chunk {
                        Some(Ok(bytes)) => {
                            buf.push_str(&decoder.push(&bytes));
                            drain_sse_lines(buf)
                        }
                        Some(Err(e)) => vec![Err(TransportError::Stream(e.to_string()))],
                        None => end_of_body(decoder, buf),
                    };
                    future::ready(Some(events))
                },
            )
            .flat_map(stream::iter)
            .take_while(|event| future::ready(!matches!(event, Ok(SseEvent::Done))))
            .filter_map(|event| {
                future::ready(match event {
                    Ok(SseEvent::Fragment(text)) => Some(Ok(text)),
                    Ok(SseEvent::Done) => None,
                    Err(e) => Some(Err(e)),
                })
            });

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &'static str {
        "completion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use axum::{
        body::Body,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn sse_backend(chunks: Vec<Vec<u8>>) -> Router {
        Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let chunks = chunks.clone();
                async move {
                    let body = stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok::<_, std::io::Error>(Bytes::from(c))),
                    );
                    Body::from_stream(body)
                }
            }),
        )
    }

    fn text_chunks(chunks: &[&str]) -> Vec<Vec<u8>> {
        chunks.iter().map(|c| c.as_bytes().to_vec()).collect()
    }

    fn transport(base_url: String) -> CompletionTransport {
        CompletionTransport::new("gsk_test".to_string(), base_url, "llama3".to_string())
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, TransportError>> {
        stream.collect().await
    }

    #[test]
    fn test_build_request_prepends_directive() {
        let transport = transport("http://test.local".to_string()).with_max_tokens(Some(256));
        let history = vec![ChatMessage::user("Find me a noir")];

        let request = transport.build_request(&history);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, SYSTEM_DIRECTIVE);
        assert_eq!(request.messages[1], history[0]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn test_max_tokens_omitted_when_unset() {
        let transport = transport("http://test.local".to_string());
        let json = serde_json::to_value(transport.build_request(&[ChatMessage::user("hi")])).unwrap();
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_chat_url_tolerates_trailing_slash() {
        let transport = transport("https://api.groq.com/openai/v1/".to_string());
        assert_eq!(
            transport.chat_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_text_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Heat"}}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap().unwrap(),
            SseEvent::Fragment("Heat".to_string())
        );
    }

    #[test]
    fn test_parse_role_only_delta_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_sse_line(line).is_none());
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap().unwrap(), SseEvent::Done);
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: message").is_none());
    }

    #[test]
    fn test_parse_error_payload() {
        let line = r#"data: {"error":{"message":"model overloaded"}}"#;
        let err = parse_sse_line(line).unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Stream(msg) if msg == "model overloaded"));
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        let err = parse_sse_line("data: {not json").unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn test_drain_keeps_partial_line() {
        let partial = r#"data: {"choices":[{"delta":{"content":"Ali"#;
        let mut buf = format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"The \"}}}}]}}\r\n{}", partial);

        let events = drain_sse_lines(&mut buf);

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &SseEvent::Fragment("The ".to_string())
        );
        assert_eq!(buf, partial);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_history_without_request() {
        // Nothing listens on this address; validation must fail first
        let transport = transport("http://127.0.0.1:9".to_string());
        let result = transport.open(&[]).await;
        assert!(matches!(result, Err(TransportError::InvalidHistory(_))));
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_events() {
        let base_url = spawn_backend(sse_backend(text_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"• Ince",
            "ption\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"\\n- Heat\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ])))
        .await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let fragments: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(fragments, vec!["• Inception", "\n- Heat"]);
    }

    #[tokio::test]
    async fn test_body_without_done_is_stream_error() {
        let base_url = spawn_backend(sse_backend(text_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Inception\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\\n- Hea",
        ])))
        .await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Inception");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_clean_close_without_done_is_stream_error() {
        let base_url = spawn_backend(sse_backend(text_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Inception\"}}]}\n\n",
        ])))
        .await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(TransportError::Stream(msg)) if msg.contains("[DONE]")));
    }

    #[tokio::test]
    async fn test_unterminated_done_line_completes() {
        let base_url = spawn_backend(sse_backend(text_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Heat\"}}]}\n\n",
            "data: [DONE]",
        ])))
        .await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let fragments: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(fragments, vec!["Heat"]);
    }

    #[test]
    fn test_end_of_body_inside_character_is_decode_error() {
        let mut decoder = Utf8Decoder::default();
        decoder.push(&"•".as_bytes()[..1]);
        let mut buf = String::new();

        let events = end_of_body(&decoder, &mut buf);

        assert!(matches!(events.as_slice(), [Err(TransportError::Decode(_))]));
    }

    #[tokio::test]
    async fn test_stream_splits_multibyte_character() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"• Arrival\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        // Cut after the first byte of the three-byte bullet
        let cut = body.find('•').unwrap() + 1;
        let base_url =
            spawn_backend(sse_backend(vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()])).await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("picks?")])
            .await
            .unwrap();
        let fragments: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(fragments, vec!["• Arrival"]);
    }

    #[tokio::test]
    async fn test_sends_auth_and_directive() {
        let captured: Arc<Mutex<Option<(HeaderMap, serde_json::Value)>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some((headers, body));
                    "data: [DONE]\n\n"
                }
            }),
        );
        let base_url = spawn_backend(app).await;

        let stream = transport(base_url)
            .open(&[ChatMessage::user("Recommend a thriller")])
            .await
            .unwrap();
        assert!(collect(stream).await.is_empty());

        let (headers, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer gsk_test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Recommend a thriller");
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base_url = spawn_backend(app).await;

        let result = transport(base_url)
            .open(&[ChatMessage::user("anything")])
            .await;

        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected failure"),
        }
    }
}
