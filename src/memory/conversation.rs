//! 对话历史：AI 导师聊天
//!
//! 历史按顺序追加；发送失败时回滚刚追加的用户消息，使可见历史只包含服务端已确认的轮次。
//! 成功的一轮结束后按 max_turns 剪枝。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api::ChatBackend;
use crate::core::ApiError;

/// 消息角色（与后端一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intention: Option<Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            intention: None,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            intention: None,
        }
    }
}

/// 聊天端点的应答
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub intention: Option<Value>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// 解析服务端时间戳：先按 RFC 3339，再按不带时区的本地写法（视为 UTC）
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let parsed = raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp);
    if parsed.is_none() && raw.as_ref().is_some_and(|v| !v.is_null()) {
        tracing::debug!(timestamp = ?raw, "Unreadable timestamp, ignoring");
    }
    Ok(parsed)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_timestamp(deserializer)?.unwrap_or_else(Utc::now))
}

/// 服务端保存的一段对话
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatTranscript {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// 短期记忆：最近 N 轮对话（每轮含 user + assistant，故实际保留约 max_turns*2 条消息）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
    }

    /// 撤销最后一条消息（仅当它是用户消息）
    fn rollback_user(&mut self) -> Option<ChatMessage> {
        match self.messages.last() {
            Some(m) if m.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.prune();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 超出 max_turns*2 时丢弃最旧的消息，保留最近部分
    fn prune(&mut self) {
        if self.messages.len() > self.max_turns * 2 {
            let keep = self.max_turns * 2;
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 一个聊天会话：历史、服务端会话 id、加载标记与最近错误
#[derive(Debug)]
pub struct ChatSession {
    history: ConversationMemory,
    session_id: Option<String>,
    is_loading: bool,
    error: Option<String>,
}

impl ChatSession {
    pub fn new(max_turns: usize) -> Self {
        Self {
            history: ConversationMemory::new(max_turns),
            session_id: None,
            is_loading: false,
            error: None,
        }
    }

    /// 发送一条消息；失败时回滚本地追加的用户消息并记录错误
    pub async fn send_message(
        &mut self,
        backend: &dyn ChatBackend,
        message: &str,
    ) -> Result<ChatReply, ApiError> {
        if message.trim().is_empty() {
            let err = ApiError::Validation("message must not be empty".to_string());
            self.error = Some(err.to_string());
            return Err(err);
        }

        self.is_loading = true;
        self.error = None;
        self.history.push(ChatMessage::user(message));

        let outcome = backend.send_message(message, self.session_id.as_deref()).await;
        self.is_loading = false;

        match outcome {
            Ok(reply) => {
                if let Some(id) = reply.conversation_id.clone() {
                    self.session_id = Some(id);
                }
                let mut answer =
                    ChatMessage::assistant(reply.response.clone(), reply.timestamp.unwrap_or_else(Utc::now));
                answer.intention = reply.intention.clone();
                self.history.push(answer);
                self.history.prune();
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chat send failed, rolling back user turn");
                self.history.rollback_user();
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// 从服务端加载历史；失败时记录错误并保留当前历史
    pub async fn load_history(&mut self, backend: &dyn ChatBackend, limit: usize) -> Result<(), ApiError> {
        self.is_loading = true;
        self.error = None;
        let outcome = backend.load_history(self.session_id.as_deref(), limit).await;
        self.is_loading = false;

        match outcome {
            Ok(Some(transcript)) => {
                if transcript.session_id.is_some() {
                    self.session_id = transcript.session_id;
                }
                self.history.replace(transcript.messages);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Loading chat history failed");
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.session_id = None;
        self.error = None;
        self.is_loading = false;
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::mock::MockChatBackend;

    #[test]
    fn test_reply_accepts_timestamp_without_offset() {
        let reply: ChatReply = serde_json::from_value(json!({
            "response": "hi",
            "conversation_id": "c",
            "timestamp": "2024-05-01T10:00:00.123456"
        }))
        .unwrap();
        let ts = reply.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");

        let reply: ChatReply =
            serde_json::from_value(json!({"response": "hi", "timestamp": "yesterday"})).unwrap();
        assert!(reply.timestamp.is_none());
        let reply: ChatReply = serde_json::from_value(json!({"response": "hi", "timestamp": null})).unwrap();
        assert!(reply.timestamp.is_none());
    }

    #[test]
    fn test_transcript_accepts_mixed_timestamps() {
        let transcript: ChatTranscript = serde_json::from_value(json!({
            "session_id": "s1",
            "messages": [
                {"role": "user", "content": "a", "timestamp": "2024-05-01T10:00:00"},
                {"role": "assistant", "content": "b", "timestamp": "2024-05-01 10:00:05.5"},
                {"role": "assistant", "content": "c", "timestamp": "2024-05-01T10:00:06Z"},
                {"role": "user", "content": "d"}
            ]
        }))
        .unwrap();
        assert_eq!(transcript.messages.len(), 4);
        assert_eq!(
            transcript.messages[0].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(transcript.messages[1].timestamp.timestamp(), transcript.messages[0].timestamp.timestamp() + 5);
        assert_eq!(
            transcript.messages[2].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 6).unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back_user_turn() {
        let backend = MockChatBackend::new();
        let mut chat = ChatSession::new(10);
        chat.send_message(&backend, "hello").await.unwrap();
        let before = chat.history().len();
        assert_eq!(before, 2);

        backend.fail_next("backend down");
        let err = chat.send_message(&backend, "hi").await;
        assert!(err.is_err());
        assert_eq!(chat.history().len(), before);
        assert!(chat.error().unwrap().contains("backend down"));
        assert!(!chat.is_loading());
    }

    #[tokio::test]
    async fn test_blank_message_does_not_touch_history() {
        let backend = MockChatBackend::new();
        let mut chat = ChatSession::new(10);
        assert!(matches!(
            chat.send_message(&backend, "   ").await,
            Err(ApiError::Validation(_))
        ));
        assert!(chat.history().is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_send_tracks_conversation_id() {
        let backend = MockChatBackend::new();
        let mut chat = ChatSession::new(10);
        chat.send_message(&backend, "what is ownership?").await.unwrap();
        assert_eq!(chat.session_id(), Some("conv-1"));
        let roles: Vec<Role> = chat.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_history_pruned_to_max_turns() {
        let backend = MockChatBackend::new();
        let mut chat = ChatSession::new(2);
        for i in 0..5 {
            chat.send_message(&backend, &format!("m{i}")).await.unwrap();
        }
        assert_eq!(chat.history().len(), 4);
        assert_eq!(chat.history()[0].content, "m3");
    }

    #[tokio::test]
    async fn test_load_history_failure_keeps_current() {
        let backend = MockChatBackend::new();
        let mut chat = ChatSession::new(10);
        chat.send_message(&backend, "hello").await.unwrap();
        backend.fail_next("500");
        assert!(chat.load_history(&backend, 50).await.is_err());
        assert_eq!(chat.history().len(), 2);

        chat.load_history(&backend, 50).await.unwrap();
        assert_eq!(chat.session_id(), Some("conv-history"));
        assert_eq!(chat.history().len(), 1);

        chat.reset();
        assert!(chat.history().is_empty());
        assert!(chat.session_id().is_none());
    }
}
