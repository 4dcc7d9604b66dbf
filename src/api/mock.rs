//! 模拟协作方（用于测试，无需后端）
//!
//! ScriptedStatusFetcher 按脚本依次返回快照，脚本用完后重复最后一项；
//! MockTrigger 为每次触发分配新 task_id，可注入一次失败；MockChatBackend 回显消息。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{ChatBackend, TaskTrigger};
use crate::core::{ApiError, StatusFetcher, StatusSnapshot, TaskRequest, TaskState, TriggerReceipt};
use crate::memory::{ChatMessage, ChatReply, ChatTranscript};

/// 按脚本返回状态快照，并记录调用次数与最大并发
#[derive(Debug, Default)]
pub struct ScriptedStatusFetcher {
    script: Vec<Result<StatusSnapshot, ApiError>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen_ids: Mutex<Vec<String>>,
}

impl ScriptedStatusFetcher {
    pub fn new(script: Vec<Result<StatusSnapshot, ApiError>>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// 每次都返回同一个快照
    pub fn always(snapshot: StatusSnapshot) -> Self {
        Self::new(vec![Ok(snapshot)])
    }

    /// 每次查询前等待 delay（模拟慢请求）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 被查询过的 task_id（按调用顺序）
    pub fn seen_ids(&self) -> Vec<String> {
        self.seen_ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatusFetcher for ScriptedStatusFetcher {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut ids) = self.seen_ids.lock() {
            ids.push(task_id.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.script.get(idx).or_else(|| self.script.last()) {
            Some(entry) => entry.clone(),
            None => Ok(StatusSnapshot::new(TaskState::Pending)),
        }
    }
}

/// 模拟触发端点
#[derive(Debug, Default)]
pub struct MockTrigger {
    calls: AtomicUsize,
    fail_next: Mutex<Option<ApiError>>,
    requests: Mutex<Vec<TaskRequest>>,
}

impl MockTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次触发返回给定错误
    pub fn fail_next(&self, err: ApiError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(err);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TaskTrigger for MockTrigger {
    async fn trigger(&self, request: &TaskRequest) -> Result<TriggerReceipt, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        let injected = self.fail_next.lock().ok().and_then(|mut slot| slot.take());
        if let Some(err) = injected {
            return Err(err);
        }
        Ok(TriggerReceipt {
            task_id: format!("task_{}", uuid::Uuid::new_v4()),
            state: TaskState::Pending,
        })
    }
}

/// 模拟聊天端点：回显消息，会话 id 固定为 conv-1
#[derive(Debug, Default)]
pub struct MockChatBackend {
    calls: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: &str) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<ApiError> {
        self.fail_next
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .map(ApiError::Transport)
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn send_message(&self, message: &str, _session_id: Option<&str>) -> Result<ChatReply, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(ChatReply {
            response: format!("Echo from Mock: {message}"),
            conversation_id: Some("conv-1".to_string()),
            timestamp: Some(Utc::now()),
            intention: None,
            suggestions: Vec::new(),
        })
    }

    async fn load_history(
        &self,
        _session_id: Option<&str>,
        _limit: usize,
    ) -> Result<Option<ChatTranscript>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(Some(ChatTranscript {
            session_id: Some("conv-history".to_string()),
            messages: vec![ChatMessage::assistant("Welcome back", Utc::now())],
        }))
    }
}
