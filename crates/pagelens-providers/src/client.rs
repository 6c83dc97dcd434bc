use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::providers::{ChatPrompt, LlmProvider};
use async_trait::async_trait;
use futures::StreamExt;
use pagelens_common::{Error, KeyValueStore, Result};
use pagelens_config::{Provider, ProviderSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Facade over the configured provider.
///
/// Configuration is re-read from the settings store on every call, so a key
/// rotated or a provider switched in the host's settings takes effect on the
/// next message without a restart.
pub struct ProviderClient {
    settings: Arc<dyn KeyValueStore>,
    openai_base: Option<String>,
    gemini_base: Option<String>,
    request_timeout: Option<Duration>,
}

impl ProviderClient {
    pub fn new(settings: Arc<dyn KeyValueStore>) -> Self {
        Self {
            settings,
            openai_base: None,
            gemini_base: None,
            request_timeout: None,
        }
    }

    pub fn with_openai_base(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base = Some(base_url.into());
        self
    }

    pub fn with_gemini_base(mut self, base_url: impl Into<String>) -> Self {
        self.gemini_base = Some(base_url.into());
        self
    }

    /// Bound the blocking completion path. Streaming calls are not bounded;
    /// dropping the in-flight future cancels them.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Blocking completion: resolve the provider, send one turn, return the
    /// full reply text.
    pub async fn send(&self, prompt: &str, image_data: Option<&str>) -> Result<String> {
        let provider = self.resolve_provider().await?;
        let chat_prompt = build_prompt(prompt, image_data);

        info!(provider = provider.provider_id(), "sending chat completion");

        match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, provider.complete(&chat_prompt))
                .await
                .map_err(|_| Error::Network("provider request timed out".to_string()))?,
            None => provider.complete(&chat_prompt).await,
        }
    }

    /// Streaming completion: `on_chunk` sees every delta in order; the
    /// concatenation of all deltas is returned once the stream ends.
    pub async fn stream(
        &self,
        prompt: &str,
        image_data: Option<&str>,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let provider = self.resolve_provider().await?;
        let chat_prompt = build_prompt(prompt, image_data);

        info!(provider = provider.provider_id(), "streaming chat completion");

        let mut stream = provider.complete_stream(&chat_prompt).await?;
        let mut full_text = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            on_chunk(&delta);
            full_text.push_str(&delta);
        }

        if full_text.is_empty() {
            return Err(Error::EmptyResponse);
        }
        debug!(chars = full_text.len(), "stream complete");
        Ok(full_text)
    }

    /// Load settings and construct the active provider. A missing key fails
    /// here, before any network I/O.
    async fn resolve_provider(&self) -> Result<Box<dyn LlmProvider>> {
        let settings = ProviderSettings::load(self.settings.as_ref()).await?;
        let api_key = settings.api_key.ok_or_else(|| {
            Error::Config(format!(
                "{} API key not configured. Please set it in the extension settings.",
                settings.provider.as_str()
            ))
        })?;

        Ok(match settings.provider {
            Provider::OpenAi => Box::new(OpenAiProvider::new(api_key, self.openai_base.clone())),
            Provider::Gemini => Box::new(GeminiProvider::new(api_key, self.gemini_base.clone())),
        })
    }
}

fn build_prompt(prompt: &str, image_data: Option<&str>) -> ChatPrompt {
    match image_data {
        Some(image) => ChatPrompt::with_image(prompt, image),
        None => ChatPrompt::text(prompt),
    }
}

/// Seam between the orchestration layer and the provider stack: anything that
/// can answer one chat turn, blocking or streaming.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, prompt: &str, image_data: Option<&str>) -> Result<String>;

    async fn stream(
        &self,
        prompt: &str,
        image_data: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String>;
}

#[async_trait]
impl ChatBackend for ProviderClient {
    async fn send(&self, prompt: &str, image_data: Option<&str>) -> Result<String> {
        ProviderClient::send(self, prompt, image_data).await
    }

    async fn stream(
        &self,
        prompt: &str,
        image_data: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        ProviderClient::stream(self, prompt, image_data, on_chunk).await
    }
}
