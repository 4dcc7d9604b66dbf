//! 核心编排层：任务句柄、状态归一化、轮询循环、会话状态与监管、各任务编排门面

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod session_supervisor;
pub mod state;
pub mod status;
pub mod task;

pub use builder::LearningTasks;
pub use error::{ApiError, TaskError, TASK_FAILED_FALLBACK};
pub use orchestrator::TaskOrchestrator;
pub use poller::{poll_until_done, spawn_poll, PollConfig, PollHandle, ProgressCallback, StatusFetcher};
pub use session_supervisor::{Generation, PollTicket, SessionSupervisor};
pub use state::{SessionState, SessionView};
pub use status::{StatusSnapshot, TaskState};
pub use task::{TaskHandle, TaskKind, TaskRequest, TriggerReceipt};
