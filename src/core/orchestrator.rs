//! 任务编排门面：每种任务一个实例，串起触发、查询、轮询与会话状态
//!
//! - start：触发任务，成功后把新任务登记为当前任务（旧轮询随代次推进被取消）
//! - check：单次查询并把快照写入会话（非当前任务的快照被忽略）
//! - poll_until_done / spawn_poll：在当前代次下轮询，迟到的快照按代次丢弃
//! - 触发失败不改动会话状态

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::TaskTrigger;
use crate::core::poller::{self, PollConfig, PollHandle, ProgressCallback, StatusFetcher};
use crate::core::session_supervisor::{Generation, PollTicket};
use crate::core::{
    ApiError, SessionState, SessionView, StatusSnapshot, TaskError, TaskHandle, TaskKind,
    TaskRequest, TaskState,
};

/// 某一任务类型的编排器
#[derive(Clone)]
pub struct TaskOrchestrator {
    kind: TaskKind,
    trigger: Arc<dyn TaskTrigger>,
    fetcher: Arc<dyn StatusFetcher>,
    session: Arc<RwLock<SessionState>>,
    poll_config: PollConfig,
}

impl TaskOrchestrator {
    pub fn new(
        kind: TaskKind,
        trigger: Arc<dyn TaskTrigger>,
        fetcher: Arc<dyn StatusFetcher>,
        poll_config: PollConfig,
    ) -> Self {
        Self {
            kind,
            trigger,
            fetcher,
            session: Arc::new(RwLock::new(SessionState::new())),
            poll_config,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll_config
    }

    /// 共享的会话状态（供 UI 层读取）
    pub fn session(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.session)
    }

    pub async fn view(&self) -> SessionView {
        self.session.read().await.view()
    }

    pub async fn is_processing(&self) -> bool {
        self.session.read().await.is_processing()
    }

    /// 触发任务并登记为当前任务
    pub async fn start(&self, request: TaskRequest) -> Result<TaskHandle, TaskError> {
        if request.kind() != self.kind {
            return Err(TaskError::InvalidInput(format!(
                "{} request cannot start a {} task",
                request.kind(),
                self.kind
            )));
        }

        let receipt = self.trigger.trigger(&request).await.map_err(|e| {
            tracing::warn!(kind = %self.kind, error = %e, "Task trigger failed");
            TaskError::Trigger(e)
        })?;
        let handle = TaskHandle::new(receipt.task_id, self.kind)
            .map_err(|_| TaskError::Trigger(ApiError::Decode("empty task id".to_string())))?;

        let agent_type = request.agent_type().map(str::to_string);
        let generation = self
            .session
            .write()
            .await
            .start(handle.clone(), receipt.state, agent_type);
        tracing::info!(
            kind = %self.kind,
            task_id = %handle.task_id(),
            generation = generation.value(),
            "Task started"
        );
        Ok(handle)
    }

    /// 查询一次状态；快照只在属于当前任务时写入会话
    pub async fn check(&self, task_id: &str) -> Result<StatusSnapshot, TaskError> {
        if task_id.trim().is_empty() {
            return Err(TaskError::InvalidInput("task id must not be empty".to_string()));
        }
        let snapshot = self
            .fetcher
            .fetch_status(task_id)
            .await
            .map_err(TaskError::Fetch)?;
        self.session.write().await.observe(task_id, &snapshot);
        Ok(snapshot)
    }

    /// 轮询到结束；同一会话上新的轮询会取消这一次
    ///
    /// `config` 为空时使用编排器的默认轮询参数。
    pub async fn poll_until_done(
        &self,
        task_id: &str,
        on_progress: Option<ProgressCallback>,
        config: Option<PollConfig>,
    ) -> Result<Value, TaskError> {
        let config = config.unwrap_or(self.poll_config);
        config.validate()?;
        let (ticket, fetcher) = self.prepare_poll(task_id).await?;
        let mut guard = PollGuard::new(&self.session, &ticket);
        let result = poller::poll_until_done(
            task_id,
            &fetcher,
            on_progress.as_ref(),
            &config,
            &ticket.token,
        )
        .await;
        finish_poll(&self.session, &ticket, &result).await;
        guard.disarm();
        result
    }

    /// 在后台轮询，返回可取消的句柄
    pub async fn spawn_poll(
        &self,
        task_id: &str,
        on_progress: Option<ProgressCallback>,
        config: Option<PollConfig>,
    ) -> Result<PollHandle, TaskError> {
        let config = config.unwrap_or(self.poll_config);
        config.validate()?;
        let (ticket, fetcher) = self.prepare_poll(task_id).await?;

        let session = Arc::clone(&self.session);
        let token = ticket.token.clone();
        let id = task_id.to_string();
        let join = tokio::spawn(async move {
            let result =
                poller::poll_until_done(&id, &fetcher, on_progress.as_ref(), &config, &ticket.token)
                    .await;
            finish_poll(&session, &ticket, &result).await;
            result
        });
        Ok(PollHandle::from_parts(task_id.to_string(), token, join))
    }

    /// 停止当前轮询，保留会话内容
    pub async fn cancel(&self) {
        self.session.write().await.cancel_poll();
    }

    /// 清空会话并取消轮询
    pub async fn reset(&self) {
        self.session.write().await.reset();
        tracing::debug!(kind = %self.kind, "Session reset");
    }

    /// 登记轮询；task_id 不是当前任务时先把它登记为当前任务
    async fn prepare_poll(&self, task_id: &str) -> Result<(PollTicket, SessionFetcher), TaskError> {
        let mut session = self.session.write().await;
        if !session.is_current(task_id) {
            let handle = TaskHandle::new(task_id, self.kind)?;
            tracing::info!(kind = %self.kind, %task_id, "Adopting task for polling");
            session.start(handle, TaskState::Pending, None);
        }
        let ticket = session
            .begin_poll()
            .ok_or_else(|| TaskError::InvalidInput("no task to poll".to_string()))?;
        let fetcher = SessionFetcher {
            inner: Arc::clone(&self.fetcher),
            session: Arc::clone(&self.session),
            generation: ticket.generation,
        };
        Ok((ticket, fetcher))
    }
}

async fn finish_poll(
    session: &RwLock<SessionState>,
    ticket: &PollTicket,
    result: &Result<Value, TaskError>,
) {
    let mut session = session.write().await;
    session.finish_poll(ticket);
    if let Err(e @ (TaskError::PollTimeout { .. } | TaskError::Fetch(_))) = result {
        session.record_error(ticket.generation, e.to_string());
    }
}

/// 轮询 future 在结束前被丢弃时，取消该次轮询并撤销登记
struct PollGuard<'a> {
    session: &'a RwLock<SessionState>,
    ticket: &'a PollTicket,
    armed: bool,
}

impl<'a> PollGuard<'a> {
    fn new(session: &'a RwLock<SessionState>, ticket: &'a PollTicket) -> Self {
        Self {
            session,
            ticket,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.ticket.token.cancel();
        // 拿不到锁时登记留在原处，但令牌已取消，has_active_poll 仍为 false
        if let Ok(mut session) = self.session.try_write() {
            session.finish_poll(self.ticket);
        }
        tracing::debug!(poll = self.ticket.id, "Poll dropped before completion");
    }
}

/// 把查询结果按代次写回会话的查询器
struct SessionFetcher {
    inner: Arc<dyn StatusFetcher>,
    session: Arc<RwLock<SessionState>>,
    generation: Generation,
}

#[async_trait]
impl StatusFetcher for SessionFetcher {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError> {
        let snapshot = self.inner.fetch_status(task_id).await?;
        self.session
            .write()
            .await
            .observe_generation(self.generation, &snapshot);
        Ok(snapshot)
    }
}
