//! OpenRouter-compatible chat-completions client
//!
//! Hand-rolled reqwest client for the hosted model gateway. Supports
//! blocking completions and SSE streaming (`data:` lines terminated by
//! `[DONE]`). The base URL is configurable so tests can point the client
//! at a mock server.

use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelGatewayConfig;
use crate::error::{Error, Result};

/// OpenRouter gateway client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    /// Create client from gateway configuration.
    pub fn from_config(config: &ModelGatewayConfig) -> Result<Self> {
        let mut client = Self::new(config.api_key.clone(), &config.model)?;
        if !config.base_url.is_empty() {
            client.base_url = config.base_url.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    /// Create client with API key and model.
    pub fn new<S: Into<String>>(api_key: S, model: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "OPENROUTER_API_KEY is empty".to_string(),
            ));
        }

        let http = Client::builder()
            .user_agent("medgraph/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: crate::config::DEFAULT_GATEWAY_URL.to_string(),
            model: model.to_string(),
        })
    }

    /// Override the gateway base URL.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion (non-streaming).
    pub async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 4096,
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ModelGateway(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::ModelGateway(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::ModelGateway(format!("{}: {}", status, text)));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::ModelGateway(format!("invalid response: {}", e)))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| Error::ModelGateway("empty response from gateway".to_string()))
    }

    /// Streaming chat completion: yields content fragments as they arrive.
    pub async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 4096,
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ModelGateway(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ModelGateway(format!("{}: {}", status, text)));
        }

        let stream = async_stream::try_stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut done = false;

            while let Some(chunk) = bytes_stream.next().await {
                let bytes = chunk
                    .map_err(|e| Error::ModelGateway(format!("stream read failed: {}", e)))?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer.drain(..=newline_pos);

                    match parse_sse_line(&line) {
                        Some(SseEvent::Fragment(text)) => {
                            yield text;
                        }
                        Some(SseEvent::Done) => {
                            done = true;
                            break;
                        }
                        None => {}
                    }
                }

                if done {
                    break;
                }
            }

            // A fragment left without a trailing newline still counts.
            if !done {
                if let Some(SseEvent::Fragment(text)) = parse_sse_line(&buffer) {
                    yield text;
                }
            }
        };

        Ok(stream)
    }
}

/// Chat message in gateway wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// A delta update in a streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

/// One chunk of a streaming response.
#[derive(Debug, Clone, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

enum SseEvent {
    Fragment(String),
    Done,
}

/// Parse a Server-Sent Events line into a content fragment.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();

    // Skip empty lines and comments
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    if line == "data: [DONE]" {
        return Some(SseEvent::Done);
    }

    let data = line.strip_prefix("data: ")?;
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let content = chunk
        .choices
        .first()
        .and_then(|c| c.delta.content.clone())?;

    Some(SseEvent::Fragment(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new("test_key", "test-model")
            .expect("client")
            .with_base_url(&server.base_url())
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = OpenRouterClient::new("   ", "test-model").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_parse_sse_content_fragment() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;

        match parse_sse_line(line) {
            Some(SseEvent::Fragment(text)) => assert_eq!(text, "Hello"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn test_parse_sse_done() {
        assert!(matches!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done)));
    }

    #[test]
    fn test_parse_sse_skips_blank_and_comments() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line("   ").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
    }

    #[test]
    fn test_parse_sse_skips_empty_delta() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(parse_sse_line(line).is_none());
    }

    #[tokio::test]
    async fn chat_completion_returns_first_choice_content() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer test_key");
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Hello!" } }
                ]
            }));
        });

        let reply = client(&server)
            .chat_completion(vec![ChatMessage::user("Hi")])
            .await
            .unwrap();

        assert_eq!(reply, "Hello!");
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_non_success_status() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let err = client(&server)
            .chat_completion(vec![])
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_invalid_json() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("not json");
        });

        let err = client(&server)
            .chat_completion(vec![])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid response"));
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_empty_choices() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let err = client(&server)
            .chat_completion(vec![])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn chat_stream_yields_fragments_in_order() {
        let server = MockServer::start_async().await;

        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"The \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"symptoms \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"include...\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let stream_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("\"stream\":true")
            });
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let stream = client(&server)
            .chat_stream(vec![ChatMessage::user("What are the symptoms?")])
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment.unwrap());
        }

        assert_eq!(fragments, vec!["The ", "symptoms ", "include..."]);
        stream_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn chat_stream_returns_error_on_non_success_status() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("upstream exploded");
        });

        let err = client(&server)
            .chat_stream(vec![ChatMessage::user("hi")])
            .await
            .err()
            .unwrap();

        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn chat_stream_stops_at_done_marker() {
        let server = MockServer::start_async().await;

        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"before\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
        );

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body(body);
        });

        let stream = client(&server)
            .chat_stream(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment.unwrap());
        }

        assert_eq!(fragments, vec!["before"]);
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("a").role, "system");
        assert_eq!(ChatMessage::user("b").role, "user");
        assert_eq!(ChatMessage::assistant("c").role, "assistant");
        assert_eq!(ChatMessage::user("b").content.as_deref(), Some("b"));
    }
}
