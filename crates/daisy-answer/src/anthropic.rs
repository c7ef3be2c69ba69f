//! Anthropic Messages API generator with SSE streaming
//!
//! Text deltas are accumulated into a single answer; the provider only
//! submits complete responses.

use crate::generator::{AnswerGenerator, GeneratorError, GeneratorResult};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You answer questions posted to a paid on-chain query market. \
    Reply with a single self-contained answer in plain text, no preamble, \
    under 900 characters.";

pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: model.into(),
            max_tokens: 400,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait::async_trait]
impl AnswerGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, query_text: &str) -> GeneratorResult<String> {
        let body = AnthropicRequest {
            model: &self.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: query_text,
            }],
            max_tokens: self.max_tokens,
            stream: true,
            system: SYSTEM_PROMPT,
        };

        debug!("Anthropic request: model={}", body.model);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 => GeneratorError::AuthFailed(error_text),
                429 => GeneratorError::RateLimited {
                    retry_after_ms: 60_000,
                },
                _ => GeneratorError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        collect_answer(response.bytes_stream()).await
    }
}

/// Drain an SSE body and join its text deltas.
pub async fn collect_answer(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> GeneratorResult<String> {
    let events = parse_sse_stream(bytes_stream);
    tokio::pin!(events);

    let mut answer = String::new();
    let mut stopped = false;
    while let Some(event) = events.next().await {
        match event? {
            SseEvent::Text(text) => answer.push_str(&text),
            SseEvent::Stop => {
                stopped = true;
                break;
            }
        }
    }
    if !stopped {
        return Err(GeneratorError::StreamError(
            "stream ended before message_stop".into(),
        ));
    }

    let answer = answer.trim().to_string();
    if answer.is_empty() {
        return Err(GeneratorError::EmptyAnswer);
    }
    Ok(answer)
}

#[derive(Debug)]
enum SseEvent {
    Text(String),
    Stop,
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = GeneratorResult<SseEvent>> + Send {
    async_stream::stream! {
        // raw bytes: a multi-byte char may straddle two chunks
        let mut buffer: Vec<u8> = Vec::new();

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(GeneratorError::StreamError(e.to_string()));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);

            while let Some(event_end) = buffer.windows(2).position(|w| w == b"\n\n") {
                let raw: Vec<u8> = buffer.drain(..event_end + 2).collect();
                let event_str = String::from_utf8_lossy(&raw[..event_end]);

                let mut event_type = String::new();
                let mut event_data = String::new();

                for line in event_str.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event_type = rest.to_string();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        event_data = rest.to_string();
                    }
                }

                if event_data.is_empty() { continue; }

                match event_type.as_str() {
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&event_data) {
                            if let DeltaType::TextDelta { text } = data.delta {
                                yield Ok(SseEvent::Text(text));
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDelta>(&event_data) {
                            if let Some(stop_reason) = data.delta.stop_reason {
                                debug!("Message complete: stop_reason={}", stop_reason);
                            }
                        }
                    }
                    "message_stop" => {
                        yield Ok(SseEvent::Stop);
                        return;
                    }
                    "error" => {
                        let message = serde_json::from_str::<ErrorEvent>(&event_data)
                            .map(|e| e.error.message)
                            .unwrap_or(event_data);
                        yield Err(GeneratorError::StreamError(message));
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    stream: bool,
    system: &'a str,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
