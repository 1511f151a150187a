//! 记忆层：按任务的对话存储、长期记忆后端、记忆桥与对话归档

pub mod bridge;
pub mod conversation;
pub mod long_term;
pub mod persistence;

pub use bridge::MemoryBridge;
pub use conversation::{ConversationStore, Message, Role};
pub use long_term::{InMemoryMemoryBackend, MemoryBackend, Metadata, NoopMemoryBackend, QueryResult};
pub use persistence::ConversationPersistence;
