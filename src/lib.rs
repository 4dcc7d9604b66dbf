//! LearnHub - 学习平台长任务编排核心
//!
//! 模块划分：
//! - **api**: HTTP 客户端、凭证来源、各任务端点与模拟实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务句柄、状态归一化、轮询循环、会话状态与各任务编排门面
//! - **memory**: AI 导师聊天历史与会话
//! - **observability**: 日志初始化
//! - **questionnaire**: 题目解析、本地评分与问卷流程

pub mod api;
pub mod config;
pub mod core;
pub mod memory;
pub mod observability;
pub mod questionnaire;

pub use crate::core::{
    LearningTasks, PollConfig, PollHandle, SessionView, StatusSnapshot, TaskError, TaskHandle,
    TaskKind, TaskOrchestrator, TaskRequest, TaskState,
};
