//! 错误类型：HTTP 协作方错误与任务编排错误
//!
//! ApiError 描述一次请求本身的失败；TaskError 是编排层对调用方暴露的分类
//! （触发失败 / 状态查询失败 / 任务失败 / 轮询超时 / 已取消）。

use thiserror::Error;

/// 服务端未给出错误信息时使用的兜底文案
pub const TASK_FAILED_FALLBACK: &str = "Task failed";

/// 一次 HTTP 调用的失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 网络层失败（连接、超时、TLS 等）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 服务端返回非 2xx
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体无法解析为期望的形状
    #[error("Decode error: {0}")]
    Decode(String),

    /// 请求在发出前即被拒绝（参数不合法）
    #[error("Validation error: {0}")]
    Validation(String),
}

/// 任务编排错误：调用方可据此区分「稍后再试」与「任务本身出错」
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// 触发请求失败，会话状态保持不变
    #[error("Trigger request failed: {0}")]
    Trigger(ApiError),

    /// 状态查询失败，当前轮询立即终止（不重试）
    #[error("Status fetch failed: {0}")]
    Fetch(ApiError),

    /// 服务端报告任务终态失败
    #[error("{0}")]
    TaskFailed(String),

    #[error("Timeout: task not finished after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    /// 轮询被显式取消，结果应被丢弃
    #[error("Poll cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TaskError {
    /// 超时可以稍后重试；其余错误需要用户介入或重新发起
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::PollTimeout { .. } | TaskError::Fetch(_))
    }
}
