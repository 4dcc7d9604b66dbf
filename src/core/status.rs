//! 状态快照：在边界处把后端的多种拼写归一为封闭枚举
//!
//! 不同端点使用 `state` 或 `status` 字段，取值既有 `SUCCESS` 也有 `success` / `succeeded`。
//! 归一只在 [`StatusSnapshot::from_value`] 中发生，内部逻辑只对 [`TaskState`] 分支。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 归一后的任务状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskState {
    /// 解析一个原始状态字符串（大小写不敏感）；无法识别时返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "received" | "retry" | "queued" => Some(TaskState::Pending),
            "started" | "running" | "progress" | "in_progress" => Some(TaskState::Started),
            "success" | "succeeded" | "completed" => Some(TaskState::Success),
            "failure" | "failed" | "revoked" | "error" => Some(TaskState::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }

    /// Pending / Started 视为处理中
    pub fn is_processing(&self) -> bool {
        !self.is_terminal()
    }
}

/// 一次状态查询的结果
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub state: TaskState,
    /// 仅在 Success 时存在
    pub result: Option<Value>,
    /// 仅在 Failure 时存在
    pub error: Option<String>,
    pub progress: Option<f64>,
    /// 服务端原始响应，供进度回调渲染
    pub raw: Value,
}

impl StatusSnapshot {
    /// 从原始 JSON 构造；`state` 优先于 `status`，缺失或未知拼写视为 Pending
    pub fn from_value(raw: Value) -> Self {
        let raw_state = ["state", "status"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str));

        let state = match raw_state {
            Some(s) => TaskState::parse(s).unwrap_or_else(|| {
                tracing::warn!(status = %s, "Unknown task status spelling, treating as pending");
                TaskState::Pending
            }),
            None => TaskState::Pending,
        };

        let result = match state {
            TaskState::Success => raw.get("result").filter(|v| !v.is_null()).cloned(),
            _ => None,
        };

        let error = match state {
            // Celery 失败时异常文本有时放在 result 中
            TaskState::Failure => raw
                .get("error")
                .filter(|v| !v.is_null())
                .or_else(|| raw.get("result").filter(|v| v.is_string()))
                .map(value_to_message),
            _ => None,
        };

        let progress = raw.get("progress").and_then(Value::as_f64);

        Self {
            state,
            result,
            error,
            progress,
            raw,
        }
    }

    /// 构造一个不携带原始响应的快照（测试与模拟后端使用）
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            result: None,
            error: None,
            progress: None,
            raw: Value::Null,
        }
    }

    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(TaskState::Success)
        }
    }

    pub fn failure(error: Option<&str>) -> Self {
        Self {
            error: error.map(String::from),
            ..Self::new(TaskState::Failure)
        }
    }
}

fn value_to_message(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_and_status_spellings_are_equivalent() {
        let a = StatusSnapshot::from_value(json!({"status": "success", "result": 1}));
        let b = StatusSnapshot::from_value(json!({"state": "SUCCESS", "result": 1}));
        assert_eq!(a.state, TaskState::Success);
        assert_eq!(a.state, b.state);
        assert_eq!(a.result, b.result);

        let c = StatusSnapshot::from_value(json!({"status": "failed", "error": "boom"}));
        let d = StatusSnapshot::from_value(json!({"state": "FAILURE", "error": "boom"}));
        assert_eq!(c.state, TaskState::Failure);
        assert_eq!(c.error, d.error);
    }

    #[test]
    fn test_state_field_takes_precedence() {
        let snap = StatusSnapshot::from_value(json!({"state": "STARTED", "status": "success"}));
        assert_eq!(snap.state, TaskState::Started);
    }

    #[test]
    fn test_backend_vocabulary() {
        assert_eq!(TaskState::parse("received"), Some(TaskState::Pending));
        assert_eq!(TaskState::parse("RETRY"), Some(TaskState::Pending));
        assert_eq!(TaskState::parse("succeeded"), Some(TaskState::Success));
        assert_eq!(TaskState::parse("Revoked"), Some(TaskState::Failure));
        assert_eq!(TaskState::parse("whatever"), None);
    }

    #[test]
    fn test_unknown_or_missing_status_is_pending() {
        assert_eq!(StatusSnapshot::from_value(json!({"status": "weird"})).state, TaskState::Pending);
        assert_eq!(StatusSnapshot::from_value(json!({})).state, TaskState::Pending);
    }

    #[test]
    fn test_result_and_error_are_exclusive() {
        let ok = StatusSnapshot::from_value(json!({"state": "SUCCESS", "result": {"x": 1}, "error": "stale"}));
        assert_eq!(ok.result, Some(json!({"x": 1})));
        assert!(ok.error.is_none());

        let failed = StatusSnapshot::from_value(json!({"state": "FAILURE", "result": {"x": 1}, "error": "bad"}));
        assert!(failed.result.is_none());
        assert_eq!(failed.error.as_deref(), Some("bad"));

        let pending = StatusSnapshot::from_value(json!({"state": "PENDING", "result": 5}));
        assert!(pending.result.is_none());
    }

    #[test]
    fn test_failure_message_from_result_string() {
        let snap = StatusSnapshot::from_value(json!({"state": "FAILURE", "result": "ValueError('x')"}));
        assert_eq!(snap.error.as_deref(), Some("ValueError('x')"));
    }

    #[test]
    fn test_progress_hint() {
        let snap = StatusSnapshot::from_value(json!({"state": "STARTED", "progress": 42}));
        assert_eq!(snap.progress, Some(42.0));
    }
}
