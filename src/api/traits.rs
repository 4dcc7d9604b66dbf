//! 外部协作方抽象
//!
//! 触发端点（返回 task_id）与聊天端点。状态查询能力见 [`crate::core::StatusFetcher`]。

use async_trait::async_trait;

use crate::core::{ApiError, TaskRequest, TriggerReceipt};
use crate::memory::{ChatReply, ChatTranscript};

/// 触发一个服务端异步作业
#[async_trait]
pub trait TaskTrigger: Send + Sync {
    async fn trigger(&self, request: &TaskRequest) -> Result<TriggerReceipt, ApiError>;
}

/// AI 导师聊天端点
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply, ApiError>;

    /// 返回最近的一段对话；服务端没有历史时为 None
    async fn load_history(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Option<ChatTranscript>, ApiError>;
}
