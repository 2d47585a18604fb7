/// LLM Client: the single point of entry for chat-completion calls.
///
/// Every interview turn goes through a `ChatProvider`. The production
/// implementation is `LlmClient`, which speaks the OpenAI-compatible
/// `/chat/completions` streaming protocol. Calls are never retried: a turn
/// is delivered at most once and a partially streamed answer is not resumable.
use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod decoder;
pub mod prompts;

use decoder::{ChunkDecoder, ChunkEvent};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("Malformed upstream chunk: {0}")]
    UpstreamParse(String),

    #[error("Upstream stream error: {0}")]
    UpstreamStream(String),

    #[error("No upstream chunk within {0:?}")]
    IdleTimeout(Duration),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Lazy, forward-only sequence of text fragments for one turn.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Parameters for one streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sends the vendor's `thinking: {type: "disabled"}` extension.
    pub disable_thinking: bool,
}

/// Anything that can turn a prompt into a fragment stream.
/// `AppState` carries an `Arc<dyn ChatProvider>` so tests can script replies.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Streaming client for an OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        // No overall timeout: a healthy stream may run for minutes.
        // Idle gaps are bounded by the relay instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatProvider for LlmClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, LlmError> {
        let body = build_request_body(&request);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::UpstreamHttp {
                status: status.as_u16(),
                message,
            });
        }

        debug!(model = %request.model, "Chat stream opened");
        Ok(decode_stream(response.bytes_stream()))
    }
}

fn build_request_body(request: &ChatRequest) -> CompletionRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref() {
        messages.push(CompletionMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(CompletionMessage {
        role: "user",
        content: &request.user,
    });

    CompletionRequest {
        model: &request.model,
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: true,
        thinking: request
            .disable_thinking
            .then_some(Thinking { kind: "disabled" }),
    }
}

/// Turns a raw byte stream from the upstream response into text fragments.
pub fn decode_stream<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    LlmError: From<E>,
{
    Box::pin(try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = ChunkDecoder::default();
        let mut done = false;

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                match event {
                    ChunkEvent::Delta(text) => {
                        yield text;
                    }
                    ChunkEvent::Failed(message) => {
                        Err::<(), _>(LlmError::UpstreamStream(message))?;
                    }
                    ChunkEvent::Done => {
                        done = true;
                        break 'read;
                    }
                }
            }
        }

        if !done {
            for event in decoder.finish() {
                match event {
                    ChunkEvent::Delta(text) => {
                        yield text;
                    }
                    ChunkEvent::Failed(message) => {
                        Err::<(), _>(LlmError::UpstreamStream(message))?;
                    }
                    ChunkEvent::Done => {}
                }
            }
        }

        if decoder.malformed() > 0 {
            debug!("Chat stream ended with {} skipped chunks", decoder.malformed());
        }
    })
}

/// Drains a fragment stream into one string.
pub async fn collect_text(mut fragments: FragmentStream) -> Result<String, LlmError> {
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Drains a fragment stream and deserializes the text as JSON.
/// The prompt must instruct the model to return valid JSON.
pub async fn collect_json<T: DeserializeOwned>(fragments: FragmentStream) -> Result<T, LlmError> {
    let text = collect_text(fragments).await?;
    if text.trim().is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(strip_json_fences(&text)).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
