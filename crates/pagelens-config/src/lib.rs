//! Provider configuration, resolved freshly from the host's key-value store
//! before every outbound call so key rotation needs no restart.

use pagelens_common::{KeyValueStore, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Storage keys recognized by the core. The host's settings UI writes these;
/// nothing here ever writes a default key.
pub mod keys {
    pub const OPENAI_API_KEY: &str = "openaiApiKey";
    pub const GEMINI_API_KEY: &str = "geminiApiKey";
    pub const PREFERRED_PROVIDER: &str = "preferredAIProvider";
    pub const GOOGLE_CLOUD_API_KEY: &str = "googleCloudApiKey";
    pub const GOOGLE_CLOUD_PROJECT_ID: &str = "googleCloudProjectId";
}

/// The two interchangeable hosted LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(Provider::OpenAi),
            "gemini" => Some(Provider::Gemini),
            _ => None,
        }
    }
}

/// Active provider plus its key, loaded per call and never cached beyond
/// single-call scope.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
}

impl ProviderSettings {
    /// Read the preferred provider and its key from the store.
    ///
    /// An unset or unrecognized `preferredAIProvider` falls back to Gemini,
    /// the default the extension ships with.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let provider = match store.get(keys::PREFERRED_PROVIDER).await? {
            Some(raw) => Provider::parse(&raw).unwrap_or_else(|| {
                warn!("unrecognized preferredAIProvider '{raw}', defaulting to gemini");
                Provider::Gemini
            }),
            None => Provider::Gemini,
        };

        let key_name = match provider {
            Provider::OpenAi => keys::OPENAI_API_KEY,
            Provider::Gemini => keys::GEMINI_API_KEY,
        };
        let api_key = store.get(key_name).await?.filter(|k| !k.is_empty());

        Ok(Self { provider, api_key })
    }
}

/// Optional Google Cloud settings consumed by host-side integrations.
#[derive(Debug, Clone, Default)]
pub struct GoogleCloudSettings {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
}

impl GoogleCloudSettings {
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let values = store
            .get_many(&[keys::GOOGLE_CLOUD_API_KEY, keys::GOOGLE_CLOUD_PROJECT_ID])
            .await?;
        Ok(Self {
            api_key: values.get(keys::GOOGLE_CLOUD_API_KEY).cloned(),
            project_id: values.get(keys::GOOGLE_CLOUD_PROJECT_ID).cloned(),
        })
    }
}
