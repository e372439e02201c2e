//! 会话状态层：消息、Prompt、单写者会话存取、持久化

pub mod message;
pub mod persistence;
#[allow(clippy::module_inception)]
pub mod prompt;
pub mod store;

pub use message::{Message, MessageOrigin, Role, ToolInvocation};
pub use persistence::PromptPersistence;
pub use prompt::Prompt;
pub use store::{PromptStore, ReadSession, WriteSession};
