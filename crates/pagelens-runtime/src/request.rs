//! The closed request surface between the host and the runtime.
//!
//! Every operation the host can ask for is a variant here; dispatch is an
//! exhaustive match, so adding an operation is a compile-time event, not a
//! stringly-typed fallthrough.

use pagelens_common::{ConversationEntry, ConversationKey, PageContext, Task};
use serde::{Deserialize, Serialize};

/// Inbound host request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Last-known page state for a conversation.
    GetPageContext { key: ConversationKey },
    /// One blocking chat turn.
    SendChatMessage {
        key: ConversationKey,
        question: String,
        context: Option<PageContext>,
    },
    /// One streaming chat turn; deltas arrive on the host bus.
    StreamChatMessage {
        key: ConversationKey,
        question: String,
        context: Option<PageContext>,
    },
    /// Run task extraction over arbitrary text.
    DetectTasks { text: String },
    GetConversation { key: ConversationKey },
    ClearConversation { key: ConversationKey },
    /// The page a conversation is attached to changed.
    PageContextUpdated {
        key: ConversationKey,
        context: PageContext,
    },
}

/// Structured reply for each request variant. Failures are not encoded here;
/// they surface as typed `Error` values the host renders inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    PageState { state: Option<PageState> },
    ChatReply { reply: String, tasks: Vec<Task> },
    Tasks { tasks: Vec<Task> },
    Conversation { entries: Vec<ConversationEntry> },
    Cleared,
    Acknowledged,
}

/// Lightweight per-conversation page tracking, refreshed by
/// `PageContextUpdated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    /// Epoch milliseconds of the last update.
    pub timestamp: i64,
}
