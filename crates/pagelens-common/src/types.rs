use serde::{Deserialize, Serialize};

/// Opaque identifier scoping one conversation (one browser tab in the
/// shipped extension, but nothing here depends on that).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// One side of a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation log. Sequences are append-only except
/// for an explicit clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structured snapshot of a web page, created fresh on each extraction and
/// immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub text: PageText,
    pub links: Vec<PageLink>,
    pub images: Vec<PageImage>,
    /// Extraction time, epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageText {
    pub body: String,
    pub headings: Vec<Heading>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    /// Heading depth, 1 through 4.
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    pub src: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
}

/// An actionable item pulled out of an assistant reply. Derived and
/// stateless; recomputed per message, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub text: String,
    pub completed: bool,
    pub source: TaskSource,
}

/// Which pattern family produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Markdown,
    Todo,
    Action,
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_entry_round_trips_through_json() {
        let entry = ConversationEntry::user("hello");
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);

        let back: ConversationEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn conversation_key_serializes_transparently() {
        let key = ConversationKey::new("tab-42");
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""tab-42""#);
        assert_eq!(key.to_string(), "tab-42");
    }

    #[test]
    fn task_source_uses_lowercase_names() {
        let task = Task {
            text: "Buy milk".to_string(),
            completed: false,
            source: TaskSource::Markdown,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["source"], "markdown");
    }
}
