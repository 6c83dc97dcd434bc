pub mod error;
pub mod kv;
pub mod types;

pub use error::{Error, Result};
pub use kv::KeyValueStore;
pub use types::{
    ConversationEntry, ConversationKey, Heading, PageContext, PageImage, PageLink, PageText, Role,
    Task, TaskSource,
};
