//! 任务句柄：服务端一次异步作业的标识
//!
//! TaskHandle 由触发调用创建，task_id 由服务端分配且不可变；created_at 仅用于诊断。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{TaskError, TaskState};

/// 任务类型：决定使用哪个状态端点
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// AI Agent 运行（chatbot / course / module）
    Agent,
    /// 问卷题目生成
    QuestionGeneration,
    /// 测验结果分析
    QuizAnalysis,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Agent => "agent",
            TaskKind::QuestionGeneration => "question_generation",
            TaskKind::QuizAnalysis => "quiz_analysis",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个服务端作业
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    task_id: String,
    kind: TaskKind,
    created_at: DateTime<Utc>,
}

impl TaskHandle {
    /// task_id 为空（或仅空白）时返回 InvalidInput
    pub fn new(task_id: impl Into<String>, kind: TaskKind) -> Result<Self, TaskError> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(TaskError::InvalidInput("task id must not be empty".to_string()));
        }
        Ok(Self {
            task_id,
            kind,
            created_at: Utc::now(),
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// 触发请求：按任务类型携带各自的参数
#[derive(Clone, Debug, PartialEq)]
pub enum TaskRequest {
    Agent { agent_type: String, params: Value },
    QuestionGeneration,
    /// evaluation 为本地评分结果（见 questionnaire::evaluate）
    QuizAnalysis { evaluation: Value },
}

impl TaskRequest {
    pub fn agent(agent_type: impl Into<String>, params: Value) -> Self {
        TaskRequest::Agent {
            agent_type: agent_type.into(),
            params,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::Agent { .. } => TaskKind::Agent,
            TaskRequest::QuestionGeneration => TaskKind::QuestionGeneration,
            TaskRequest::QuizAnalysis { .. } => TaskKind::QuizAnalysis,
        }
    }

    pub fn agent_type(&self) -> Option<&str> {
        match self {
            TaskRequest::Agent { agent_type, .. } => Some(agent_type.as_str()),
            _ => None,
        }
    }
}

/// 触发端点的应答：`{task_id, status}`
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerReceipt {
    pub task_id: String,
    /// 服务端未返回状态时视为 Pending
    pub state: TaskState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_task_id_rejected() {
        assert!(matches!(
            TaskHandle::new("   ", TaskKind::Agent),
            Err(TaskError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_handle_accessors() {
        let handle = TaskHandle::new("abc-123", TaskKind::QuizAnalysis).unwrap();
        assert_eq!(handle.task_id(), "abc-123");
        assert_eq!(handle.kind(), TaskKind::QuizAnalysis);
        assert!(handle.created_at() <= Utc::now());
    }

    #[test]
    fn test_request_kind() {
        let req = TaskRequest::agent("chatbot", serde_json::json!({"topic": "rust"}));
        assert_eq!(req.kind(), TaskKind::Agent);
        assert_eq!(req.agent_type(), Some("chatbot"));
        assert_eq!(TaskRequest::QuestionGeneration.agent_type(), None);
    }
}
