use crate::providers::{ChatPrompt, LlmProvider, SYSTEM_PROMPT, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pagelens_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";
const MAX_TOKENS: u32 = 2000;
const TEMPERATURE: f64 = 0.7;

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
        }
    }

    pub fn with_models(mut self, model: impl Into<String>, vision_model: impl Into<String>) -> Self {
        self.model = model.into();
        self.vision_model = vision_model.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.convert_request(prompt, false);

        debug!(model = %request.model, "openai completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("OpenAI response: {e}")))?;

        let choice = body.choices.into_iter().next().ok_or(Error::EmptyResponse)?;
        if let Some(reason) = &choice.finish_reason
            && reason != "stop"
        {
            warn!("openai completion finished with reason {reason}");
        }

        choice
            .message
            .content
            .filter(|content| !content.is_empty())
            .ok_or(Error::EmptyResponse)
    }

    async fn complete_stream(&self, prompt: &ChatPrompt) -> Result<TextStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.convert_request(prompt, true);

        debug!(model = %request.model, "openai streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(Box::pin(SseTextStream::new(response.bytes_stream())))
    }
}

impl OpenAiProvider {
    fn convert_request(&self, prompt: &ChatPrompt, stream: bool) -> OpenAiRequest {
        let user_content = match &prompt.image_data {
            Some(image) => OpenAiUserContent::Parts(vec![
                OpenAiContentPart::Text {
                    text: prompt.text.clone(),
                },
                OpenAiContentPart::ImageUrl {
                    image_url: OpenAiImageUrl {
                        url: as_data_url(image),
                    },
                },
            ]),
            None => OpenAiUserContent::Text(prompt.text.clone()),
        };

        let model = if prompt.image_data.is_some() {
            self.vision_model.clone()
        } else {
            self.model.clone()
        };

        OpenAiRequest {
            model,
            messages: vec![
                OpenAiMessage::System {
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAiMessage::User {
                    content: user_content,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream,
        }
    }
}

/// The chat-completions image slot takes a data URL; bare base64 is wrapped.
fn as_data_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/png;base64,{image}")
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<OpenAiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

// Request Types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiMessage {
    System { content: String },
    User { content: OpenAiUserContent },
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAiUserContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Serialize)]
struct OpenAiImageUrl {
    url: String,
}

// Response Types
#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// Stream Parser
//
// SSE frames arrive as `data: {...}` lines with a terminal `data: [DONE]`.
// Network reads split frames at arbitrary byte offsets, so complete lines are
// carved out of a carry-over buffer; malformed data lines are skipped rather
// than aborting the stream.
pub(crate) struct SseTextStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    buffer: String,
    queue: VecDeque<Result<String>>,
    finished: bool,
}

impl SseTextStream {
    pub(crate) fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        let inner = stream.map(|item| item.map_err(|e| Error::Network(format!("stream error: {e}"))));
        Self {
            inner: Box::pin(inner),
            buffer: String::new(),
            queue: VecDeque::new(),
            finished: false,
        }
    }

    fn process_line(&mut self, line: &str) {
        if self.finished {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }
        match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => {
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content
                        && !content.is_empty()
                    {
                        self.queue.push_back(Ok(content));
                    }
                }
            }
            Err(e) => {
                debug!("skipping unparseable sse line: {e}");
            }
        }
    }
}

impl Stream for SseTextStream {
    type Item = Result<String>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.queue.pop_front() {
                return std::task::Poll::Ready(Some(item));
            }
            if this.finished {
                return std::task::Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = this.buffer.find('\n') {
                        let line: String = this.buffer.drain(..=pos).collect();
                        this.process_line(line.trim_end_matches(['\n', '\r']).trim());
                    }
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Some(Err(e)));
                }
                std::task::Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(&mut this.buffer);
                        this.process_line(line.trim());
                    }
                    this.finished = true;
                }
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}
