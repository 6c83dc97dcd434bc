use crate::providers::{ChatPrompt, LlmProvider, SYSTEM_PROMPT, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pagelens_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.7;
const IMAGE_MIME_TYPE: &str = "image/png";

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, "gemini completion request");

        let response = self
            .client
            .post(&url)
            .json(&convert_request(prompt))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Gemini response read failed: {e}")))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| Error::Parse(format!("Gemini response: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(candidate_text)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(text)
    }

    async fn complete_stream(&self, prompt: &ChatPrompt) -> Result<TextStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, "gemini streaming request");

        let response = self
            .client
            .post(&url)
            .json(&convert_request(prompt))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(Box::pin(GeminiTextStream::new(response.bytes_stream())))
    }
}

fn convert_request(prompt: &ChatPrompt) -> GenerateContentRequest {
    let mut parts = vec![Part::Text {
        text: prompt.text.clone(),
    }];

    if let Some(image) = &prompt.image_data {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: IMAGE_MIME_TYPE.to_string(),
                data: strip_data_url_prefix(image),
            },
        });
    }

    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
        system_instruction: Some(Content {
            role: "user".to_string(),
            parts: vec![Part::Text {
                text: SYSTEM_PROMPT.to_string(),
            }],
        }),
        generation_config: Some(GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        }),
    }
}

/// The inline_data slot takes bare base64; data URLs are unwrapped.
fn strip_data_url_prefix(image: &str) -> String {
    match image.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload.to_string(),
        _ => image.to_string(),
    }
}

fn candidate_text(candidate: Candidate) -> String {
    let mut text = String::new();
    for part in candidate.content.parts {
        if let Part::Text { text: t } = part {
            text.push_str(&t);
        }
    }
    text
}

fn api_error(status: reqwest::StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<GeminiErrorEnvelope>(body)
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

// Wire Types
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

// Stream Parser
//
// streamGenerateContent responds with newline-delimited JSON objects wrapped
// in array punctuation, not SSE frames. The last line of a read may be a
// truncated object, so it is held back until more bytes arrive; whatever
// remains when the connection closes is parsed as the final fragment.
pub(crate) struct GeminiTextStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    buffer: String,
    queue: VecDeque<Result<String>>,
    finished: bool,
}

impl GeminiTextStream {
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
        let trimmed = line
            .trim()
            .trim_start_matches(['[', ','])
            .trim_end_matches([']', ','])
            .trim();
        if trimmed.is_empty() {
            return;
        }

        let parsed = serde_json::from_str::<StreamChunk>(trimmed).or_else(|_| {
            serde_json::from_str::<StreamChunk>(trimmed.strip_prefix("data:").unwrap_or("").trim())
        });

        match parsed {
            Ok(chunk) => {
                for candidate in chunk.candidates.unwrap_or_default() {
                    let text = candidate_text(candidate);
                    if !text.is_empty() {
                        self.queue.push_back(Ok(text));
                    }
                }
            }
            Err(e) => {
                debug!("skipping unparseable gemini stream line: {e}");
            }
        }
    }
}

impl Stream for GeminiTextStream {
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
                    // Complete lines only; the tail may be a truncated object.
                    while let Some(pos) = this.buffer.find('\n') {
                        let line: String = this.buffer.drain(..=pos).collect();
                        this.process_line(&line);
                    }
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Some(Err(e)));
                }
                std::task::Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let tail = std::mem::take(&mut this.buffer);
                        this.process_line(&tail);
                    }
                    this.finished = true;
                }
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}
