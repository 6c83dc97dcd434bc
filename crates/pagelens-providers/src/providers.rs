use async_trait::async_trait;
use futures::Stream;
use pagelens_common::Result;
use std::pin::Pin;

/// System instruction sent with every chat turn, both providers.
pub const SYSTEM_PROMPT: &str = "You are PageLens, an AI assistant that helps users understand \
and interact with web content. You can see and analyze web pages to answer questions.";

/// Trait for hosted LLM backends (OpenAI-style, Gemini-style).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "openai", "gemini").
    fn provider_id(&self) -> &str;

    /// Send a blocking completion request and return the reply text.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String>;

    /// Send a streaming completion request and return a stream of text deltas.
    async fn complete_stream(&self, prompt: &ChatPrompt) -> Result<TextStream>;
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single formatted user turn: the prompt text plus an optional screenshot.
///
/// `image_data` may be a full data URL or bare base64; each provider adapts it
/// to its own wire shape.
#[derive(Debug, Clone, Default)]
pub struct ChatPrompt {
    pub text: String,
    pub image_data: Option<String>,
}

impl ChatPrompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_data: None,
        }
    }

    pub fn with_image(text: impl Into<String>, image_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_data: Some(image_data.into()),
        }
    }
}
