//! 会话状态：某个功能（Agent 会话 / 问卷 / 测验分析）当前任务的进度与结果
//!
//! 由拥有该功能生命周期的组件显式持有，不通过全局键查找。
//! 终态时 result 与 error 互斥；来自非当前任务或已被取代代次的快照一律忽略。

use serde::Serialize;
use serde_json::Value;

use crate::core::session_supervisor::{Generation, PollTicket, SessionSupervisor};
use crate::core::{StatusSnapshot, TaskHandle, TaskKind, TaskState, TASK_FAILED_FALLBACK};

/// 一个功能的会话状态
#[derive(Debug, Default)]
pub struct SessionState {
    current_task: Option<TaskHandle>,
    agent_type: Option<String>,
    status: Option<TaskState>,
    result: Option<Value>,
    error: Option<String>,
    progress: Option<f64>,
    supervisor: SessionSupervisor,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪新任务：清空旧结果，取消旧代次的轮询，返回新代次
    pub fn start(&mut self, handle: TaskHandle, initial: TaskState, agent_type: Option<String>) -> Generation {
        let generation = self.supervisor.advance();
        tracing::debug!(
            task_id = %handle.task_id(),
            kind = %handle.kind(),
            generation = generation.value(),
            "Session tracking new task"
        );
        self.current_task = Some(handle);
        self.agent_type = agent_type;
        self.status = Some(initial);
        self.result = None;
        self.error = None;
        self.progress = None;
        generation
    }

    /// 按 task_id 应用快照；不是当前任务时为 no-op，返回是否生效
    pub fn observe(&mut self, task_id: &str, snapshot: &StatusSnapshot) -> bool {
        if !self.is_current(task_id) {
            tracing::debug!(%task_id, "Ignoring snapshot for a task that is not tracked");
            return false;
        }
        self.apply(snapshot);
        true
    }

    /// 按代次应用快照；代次已被取代时丢弃
    pub fn observe_generation(&mut self, generation: Generation, snapshot: &StatusSnapshot) -> bool {
        if generation != self.supervisor.generation() || self.current_task.is_none() {
            tracing::warn!(
                stale = generation.value(),
                current = self.supervisor.generation().value(),
                "Discarding late snapshot from superseded poll"
            );
            return false;
        }
        self.apply(snapshot);
        true
    }

    /// 记录轮询层面的错误（超时 / 查询失败）；已到终态或代次已过期时忽略
    pub fn record_error(&mut self, generation: Generation, message: impl Into<String>) -> bool {
        if generation != self.supervisor.generation() {
            return false;
        }
        if self.status.map(|s| s.is_terminal()).unwrap_or(false) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    fn apply(&mut self, snapshot: &StatusSnapshot) {
        self.status = Some(snapshot.state);
        if snapshot.progress.is_some() {
            self.progress = snapshot.progress;
        }
        match snapshot.state {
            TaskState::Success => {
                self.result = Some(snapshot.result.clone().unwrap_or(Value::Null));
                self.error = None;
            }
            TaskState::Failure => {
                self.error = Some(
                    snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| TASK_FAILED_FALLBACK.to_string()),
                );
                self.result = None;
            }
            TaskState::Pending | TaskState::Started => {}
        }
    }

    /// 回到初始空状态；可在任意时刻调用，包括轮询进行中（会取消轮询）
    pub fn reset(&mut self) {
        self.supervisor.advance();
        self.current_task = None;
        self.agent_type = None;
        self.status = None;
        self.result = None;
        self.error = None;
        self.progress = None;
    }

    /// 为当前任务登记轮询；没有任务时返回 None
    pub fn begin_poll(&mut self) -> Option<PollTicket> {
        self.current_task.as_ref()?;
        Some(self.supervisor.begin_poll())
    }

    pub fn finish_poll(&mut self, ticket: &PollTicket) {
        self.supervisor.finish_poll(ticket);
    }

    pub fn cancel_poll(&mut self) {
        self.supervisor.cancel_poll();
    }

    pub fn has_active_poll(&self) -> bool {
        self.supervisor.has_active_poll()
    }

    pub fn is_current(&self, task_id: &str) -> bool {
        self.current_task
            .as_ref()
            .map(|h| h.task_id() == task_id)
            .unwrap_or(false)
    }

    pub fn current_task(&self) -> Option<&TaskHandle> {
        self.current_task.as_ref()
    }

    pub fn status(&self) -> Option<TaskState> {
        self.status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generation(&self) -> Generation {
        self.supervisor.generation()
    }

    /// 最近一次观察到的状态为 Pending / Started
    pub fn is_processing(&self) -> bool {
        self.status.map(|s| s.is_processing()).unwrap_or(false)
    }

    /// 生成 UI 可渲染的投影
    pub fn view(&self) -> SessionView {
        SessionView {
            task_id: self.current_task.as_ref().map(|h| h.task_id().to_string()),
            kind: self.current_task.as_ref().map(|h| h.kind()),
            agent_type: self.agent_type.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            progress: self.progress,
            is_processing: self.is_processing(),
        }
    }
}

/// 会话状态的只读投影
#[derive(Clone, Debug, PartialEq, Serialize, Default)]
pub struct SessionView {
    pub task_id: Option<String>,
    pub kind: Option<TaskKind>,
    pub agent_type: Option<String>,
    pub status: Option<TaskState>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: Option<f64>,
    pub is_processing: bool,
}
