use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Durable key-value persistence as exposed by the extension host.
///
/// Conversation history and provider settings both live behind this seam, so
/// the core never knows whether it is talking to `chrome.storage`, sqlite, or
/// an in-memory double in tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// List all stored keys starting with `prefix`, in unspecified order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch several keys at once. Missing keys are simply absent from the
    /// returned map.
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let mut values = HashMap::new();
        for key in keys {
            if let Some(value) = self.get(key).await? {
                values.insert((*key).to_string(), value);
            }
        }
        Ok(values)
    }
}
