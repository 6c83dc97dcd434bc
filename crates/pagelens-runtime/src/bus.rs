//! Outbound seams to the extension host.
//!
//! The host owns the UI surfaces and the browser APIs; the runtime only ever
//! reaches them through these traits. A bus failure means the surface went
//! away (panel closed, tab gone) and is never fatal to the pipeline.

use async_trait::async_trait;
use pagelens_common::{ConversationKey, Result, Task};
use serde::{Deserialize, Serialize};

/// Events pushed from the runtime to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostEvent {
    /// One streaming delta.
    StreamChunk {
        key: ConversationKey,
        delta: String,
    },
    /// A streaming turn finished; `reply` is the concatenation of all deltas.
    StreamComplete {
        key: ConversationKey,
        reply: String,
        tasks: Vec<Task>,
    },
    /// A blocking turn finished.
    AssistantReply {
        key: ConversationKey,
        reply: String,
        tasks: Vec<Task>,
    },
}

/// Outbound host messaging. Implementations may fail with
/// `Error::HostUnavailable`; callers treat that as a dropped update.
#[async_trait]
pub trait HostBus: Send + Sync {
    async fn emit(&self, event: HostEvent) -> Result<()>;
}

/// Host-side screenshot capture of the visible page, returned as a PNG data
/// URL.
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    async fn capture_visible_page(&self) -> Result<String>;
}
