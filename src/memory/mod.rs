//! 对话记忆：AI 导师聊天历史与会话

pub mod conversation;

pub use conversation::{ChatMessage, ChatReply, ChatSession, ChatTranscript, ConversationMemory, Role};
