pub mod conversation;
pub mod memory;
pub mod sqlite;

pub use conversation::ConversationStore;
pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;
