//! 各任务类型的 HTTP 端点
//!
//! HttpTaskEndpoint 同时实现触发（TaskTrigger）与状态查询（StatusFetcher）：
//! - Agent：POST 启动 `{agent_type, params}`，GET 查询状态
//! - 题目生成：GET 触发，GET question_result
//! - 测验分析：POST 评分结果，GET analysis_result

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::client::fill_task_path;
use crate::api::{ApiClient, ChatBackend, TaskTrigger};
use crate::config::PathsSection;
use crate::core::{ApiError, StatusFetcher, StatusSnapshot, TaskKind, TaskRequest, TaskState, TriggerReceipt};
use crate::memory::{ChatReply, ChatTranscript};

/// 某一任务类型的触发与状态端点
#[derive(Clone)]
pub struct HttpTaskEndpoint {
    client: ApiClient,
    kind: TaskKind,
    trigger_path: String,
    status_path: String,
}

impl HttpTaskEndpoint {
    pub fn new(client: ApiClient, kind: TaskKind, paths: &PathsSection) -> Self {
        let (trigger_path, status_path) = match kind {
            TaskKind::Agent => (&paths.agent_start, &paths.agent_status),
            TaskKind::QuestionGeneration => (&paths.question_generate, &paths.question_status),
            TaskKind::QuizAnalysis => (&paths.quiz_analyze, &paths.quiz_status),
        };
        Self {
            client,
            kind,
            trigger_path: trigger_path.clone(),
            status_path: status_path.clone(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

#[async_trait]
impl TaskTrigger for HttpTaskEndpoint {
    async fn trigger(&self, request: &TaskRequest) -> Result<TriggerReceipt, ApiError> {
        if request.kind() != self.kind {
            return Err(ApiError::Validation(format!(
                "{} request sent to {} endpoint",
                request.kind(),
                self.kind
            )));
        }

        let response = match request {
            TaskRequest::Agent { agent_type, params } => {
                let body = json!({ "agent_type": agent_type, "params": params });
                self.client.post_json(&self.trigger_path, &body).await?
            }
            TaskRequest::QuestionGeneration => self.client.get_json(&self.trigger_path).await?,
            TaskRequest::QuizAnalysis { evaluation } => {
                self.client.post_json(&self.trigger_path, evaluation).await?
            }
        };
        parse_trigger_receipt(&response)
    }
}

#[async_trait]
impl StatusFetcher for HttpTaskEndpoint {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError> {
        let path = fill_task_path(&self.status_path, task_id);
        let raw = self.client.get_json(&path).await?;
        if !raw.is_object() {
            return Err(ApiError::Decode(format!("status response is not an object: {raw}")));
        }
        Ok(StatusSnapshot::from_value(raw))
    }
}

/// 解析触发应答；缺少 task_id 视为失败
pub fn parse_trigger_receipt(response: &Value) -> Result<TriggerReceipt, ApiError> {
    let task_id = response
        .get("task_id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Decode("no task_id in trigger response".to_string()))?;

    let state = ["state", "status"]
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_str))
        .and_then(TaskState::parse)
        .unwrap_or(TaskState::Pending);

    Ok(TriggerReceipt {
        task_id: task_id.to_string(),
        state,
    })
}

/// AI 导师聊天端点
#[derive(Clone)]
pub struct HttpChatBackend {
    client: ApiClient,
    chat_path: String,
    history_path: String,
}

impl HttpChatBackend {
    pub fn new(client: ApiClient, paths: &PathsSection) -> Self {
        Self {
            client,
            chat_path: paths.chat.clone(),
            history_path: paths.chat_history.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_message(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply, ApiError> {
        let body = json!({ "message": message, "session_id": session_id });
        let raw = self.client.post_json(&self.chat_path, &body).await?;
        if raw.is_null() {
            return Err(ApiError::Decode("empty chat response".to_string()));
        }
        serde_json::from_value(raw).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn load_history(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Option<ChatTranscript>, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(id) = session_id {
            query.push(("session_id", id.to_string()));
        }
        let raw = self
            .client
            .get_json_with_query(&self.history_path, &query)
            .await?;
        parse_transcript(raw)
    }
}

/// 历史响应有两种形状：`{conversation: {...}}` 或 `{conversations: [...]}`（取第一段）
pub fn parse_transcript(raw: Value) -> Result<Option<ChatTranscript>, ApiError> {
    let conversation = match raw.get("conversation").filter(|c| c.is_object()) {
        Some(c) => Some(c.clone()),
        None => raw
            .get("conversations")
            .and_then(Value::as_array)
            .and_then(|list| list.first().cloned()),
    };
    conversation
        .map(|c| serde_json::from_value(c).map_err(|e| ApiError::Decode(e.to_string())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_receipt_requires_task_id() {
        let err = parse_trigger_receipt(&json!({"status": "PENDING"})).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(parse_trigger_receipt(&json!({"task_id": ""})).is_err());

        let ok = parse_trigger_receipt(&json!({"task_id": "t-9", "status": "started"})).unwrap();
        assert_eq!(ok.task_id, "t-9");
        assert_eq!(ok.state, TaskState::Started);

        let bare = parse_trigger_receipt(&json!({"task_id": "t-10"})).unwrap();
        assert_eq!(bare.state, TaskState::Pending);
    }

    #[test]
    fn test_transcript_shapes() {
        let single = json!({
            "conversation": {
                "session_id": "s1",
                "messages": [{"role": "user", "content": "hi", "timestamp": "2024-05-01T10:00:00Z"}]
            }
        });
        let t = parse_transcript(single).unwrap().unwrap();
        assert_eq!(t.session_id.as_deref(), Some("s1"));
        assert_eq!(t.messages.len(), 1);

        let many = json!({"conversations": [{"session_id": "s2", "messages": []}, {"session_id": "s3"}]});
        let t = parse_transcript(many).unwrap().unwrap();
        assert_eq!(t.session_id.as_deref(), Some("s2"));

        assert!(parse_transcript(json!({"conversations": []})).unwrap().is_none());
        assert!(parse_transcript(json!({})).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trigger_rejects_mismatched_kind() {
        use std::sync::Arc;

        let client = ApiClient::new("http://127.0.0.1:9", 1, Arc::new(crate::api::NoCredentials)).unwrap();
        let endpoint = HttpTaskEndpoint::new(client, TaskKind::QuizAnalysis, &PathsSection::default());
        let err = endpoint.trigger(&TaskRequest::QuestionGeneration).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
