//! 轮询循环：按固定间隔查询任务状态，直到终态、超时、查询失败或被取消
//!
//! - 每个间隔只发起一次查询；第 N 次查询在第 N-1 次完成并评估之后才会发出
//! - 每次拿到快照先调用 on_progress，再判断是否终止（终态那一拍也会回调）
//! - 超时按尝试次数计算，慢查询只会推迟、不会消耗尝试次数
//! - 取消通过 CancellationToken 协作完成：取消后不再发起查询、不再回调

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PollingSection;
use crate::core::{ApiError, StatusSnapshot, TaskError, TaskState, TASK_FAILED_FALLBACK};

/// 状态查询能力：给定 task_id 返回当前状态快照
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError>;
}

/// 进度回调：每次查询后以快照调用
pub type ProgressCallback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// 轮询参数（尝试次数上限与间隔）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_millis(2000),
        }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval_ms: u64) -> Result<Self, TaskError> {
        let config = Self {
            max_attempts,
            interval: Duration::from_millis(interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// max_attempts ≥ 1 且 interval > 0
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.max_attempts == 0 {
            return Err(TaskError::InvalidInput("max_attempts must be at least 1".to_string()));
        }
        if self.interval.is_zero() {
            return Err(TaskError::InvalidInput("interval must be positive".to_string()));
        }
        Ok(())
    }
}

impl TryFrom<&PollingSection> for PollConfig {
    type Error = TaskError;

    fn try_from(section: &PollingSection) -> Result<Self, Self::Error> {
        PollConfig::new(section.max_attempts, section.interval_ms)
    }
}

/// 轮询直到任务结束
///
/// 成功返回 result（缺失时为 `Value::Null`）；失败返回 TaskFailed / PollTimeout / Fetch；
/// token 被取消时返回 Cancelled，调用方应丢弃该结果。
pub async fn poll_until_done(
    task_id: &str,
    fetcher: &dyn StatusFetcher,
    on_progress: Option<&ProgressCallback>,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Value, TaskError> {
    if task_id.trim().is_empty() {
        return Err(TaskError::InvalidInput("task id must not be empty".to_string()));
    }
    config.validate()?;

    let mut attempts: u32 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            _ = tokio::time::sleep(config.interval) => {}
        }

        attempts += 1;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            r = fetcher.fetch_status(task_id) => r,
        };

        let snapshot = match fetched {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%task_id, attempt = attempts, error = %e, "Status fetch failed, aborting poll");
                return Err(TaskError::Fetch(e));
            }
        };

        if let Some(cb) = on_progress {
            cb(&snapshot);
        }

        match snapshot.state {
            TaskState::Success => {
                tracing::info!(%task_id, attempts, "Task succeeded");
                return Ok(snapshot.result.unwrap_or(Value::Null));
            }
            TaskState::Failure => {
                let message = snapshot
                    .error
                    .unwrap_or_else(|| TASK_FAILED_FALLBACK.to_string());
                tracing::info!(%task_id, attempts, error = %message, "Task failed");
                return Err(TaskError::TaskFailed(message));
            }
            _ if attempts >= config.max_attempts => {
                tracing::warn!(%task_id, attempts, "Poll attempt budget exhausted");
                return Err(TaskError::PollTimeout { attempts });
            }
            state => {
                tracing::debug!(%task_id, attempt = attempts, ?state, "Task not finished yet");
            }
        }
    }
}

/// 在后台任务中运行轮询，返回可取消的句柄
pub fn spawn_poll(
    task_id: String,
    fetcher: Arc<dyn StatusFetcher>,
    on_progress: Option<ProgressCallback>,
    config: PollConfig,
    cancel: CancellationToken,
) -> PollHandle {
    let token = cancel.clone();
    let id = task_id.clone();
    let join = tokio::spawn(async move {
        poll_until_done(&id, fetcher.as_ref(), on_progress.as_ref(), &config, &token).await
    });
    PollHandle::from_parts(task_id, cancel, join)
}

/// 后台轮询句柄
///
/// 丢弃句柄即放弃轮询（会触发取消）；需要轮询继续跑完请调用 [`PollHandle::detach`]。
#[derive(Debug)]
pub struct PollHandle {
    task_id: String,
    cancel: CancellationToken,
    join: Option<JoinHandle<Result<Value, TaskError>>>,
}

impl PollHandle {
    pub(crate) fn from_parts(
        task_id: String,
        cancel: CancellationToken,
        join: JoinHandle<Result<Value, TaskError>>,
    ) -> Self {
        Self {
            task_id,
            cancel,
            join: Some(join),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 停止调度后续查询；轮询若尚未结束，outcome 返回 None
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// 等待轮询结束；被取消中断的轮询返回 None，取消前已得出的结果照常返回
    pub async fn outcome(mut self) -> Option<Result<Value, TaskError>> {
        let join = self.join.take()?;
        match join.await {
            Ok(Err(TaskError::Cancelled)) => None,
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "Poll task aborted");
                None
            }
        }
    }

    /// 让轮询在后台继续运行，不再关心其结果
    pub fn detach(mut self) {
        self.join.take();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel.cancel();
        }
    }
}
