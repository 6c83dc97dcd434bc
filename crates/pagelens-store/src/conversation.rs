use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pagelens_common::{ConversationEntry, ConversationKey, Error, KeyValueStore, Result};
use tracing::debug;

/// Prefix distinguishing conversation logs from other stored settings.
const CONVERSATION_KEY_PREFIX: &str = "conversation_";

/// Per-conversation message log: an in-memory cache in front of durable
/// key-value persistence.
///
/// Reads are cache-first; a miss loads from the durable layer and populates
/// the cache. Appends write through to the durable layer and are awaited
/// before returning, so the most recent turn survives an abrupt shutdown.
/// Serialization of concurrent writers for the same key is the caller's
/// responsibility.
pub struct ConversationStore {
    durable: Arc<dyn KeyValueStore>,
    cache: Mutex<HashMap<ConversationKey, Vec<ConversationEntry>>>,
}

impl ConversationStore {
    pub fn new(durable: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn storage_key(key: &ConversationKey) -> String {
        format!("{CONVERSATION_KEY_PREFIX}{key}")
    }

    /// Append one entry, writing through to durable storage before returning.
    pub async fn append(&self, key: &ConversationKey, entry: ConversationEntry) -> Result<()> {
        let mut entries = self.get_all(key).await?;
        entries.push(entry);

        let serialized = serde_json::to_string(&entries)
            .map_err(|e| Error::Storage(format!("failed to serialize conversation: {e}")))?;
        self.durable.set(&Self::storage_key(key), &serialized).await?;

        self.cache.lock().unwrap().insert(key.clone(), entries);
        Ok(())
    }

    /// All entries for a key in insertion order. Never fails with "missing":
    /// an unknown key yields an empty vec.
    pub async fn get_all(&self, key: &ConversationKey) -> Result<Vec<ConversationEntry>> {
        if let Some(entries) = self.cache.lock().unwrap().get(key) {
            return Ok(entries.clone());
        }

        let entries = match self.durable.get(&Self::storage_key(key)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("corrupted conversation data: {e}")))?,
            None => Vec::new(),
        };

        debug!("loaded {} entries for conversation {key}", entries.len());
        self.cache.lock().unwrap().insert(key.clone(), entries.clone());
        Ok(entries)
    }

    /// Remove the conversation from both the cache and durable storage.
    pub async fn clear(&self, key: &ConversationKey) -> Result<()> {
        self.cache.lock().unwrap().remove(key);
        self.durable.remove(&Self::storage_key(key)).await
    }

    /// List every persisted conversation key, for history views and
    /// debugging. Scans the durable layer, not the cache.
    pub async fn all_conversation_keys(&self) -> Result<Vec<ConversationKey>> {
        let keys = self
            .durable
            .keys_with_prefix(CONVERSATION_KEY_PREFIX)
            .await?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(CONVERSATION_KEY_PREFIX))
            .map(ConversationKey::new)
            .collect())
    }
}
