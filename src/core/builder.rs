//! 学习平台任务构建器：按配置统一创建三种任务的编排器与聊天端点
//!
//! CLI、测试与嵌入方共用同一套装配逻辑；测试可通过 [`LearningTasksBuilder::with_backends`]
//! 换成模拟协作方。

use std::sync::Arc;

use crate::api::{
    ApiClient, ChatBackend, CredentialSource, EnvToken, HttpChatBackend, HttpTaskEndpoint,
    TaskTrigger,
};
use crate::config::AppConfig;
use crate::core::{PollConfig, StatusFetcher, TaskError, TaskKind, TaskOrchestrator};
use crate::memory::ChatSession;

/// 装配完成的各功能组件
#[derive(Clone)]
pub struct LearningTasks {
    pub agent: TaskOrchestrator,
    pub questions: TaskOrchestrator,
    pub quiz: TaskOrchestrator,
    pub chat: Arc<dyn ChatBackend>,
    pub config: AppConfig,
}

impl LearningTasks {
    /// 使用默认凭证来源（`api.token_env` 环境变量）构建
    pub fn from_config(config: AppConfig) -> Result<Self, TaskError> {
        LearningTasksBuilder::new(config).build()
    }

    pub fn orchestrator(&self, kind: TaskKind) -> &TaskOrchestrator {
        match kind {
            TaskKind::Agent => &self.agent,
            TaskKind::QuestionGeneration => &self.questions,
            TaskKind::QuizAnalysis => &self.quiz,
        }
    }

    /// 新的空聊天会话（保留轮数取自 `[chat]`）
    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(self.config.chat.max_history_turns)
    }

    /// 重置全部任务会话，取消所有轮询
    pub async fn reset_all(&self) {
        self.agent.reset().await;
        self.questions.reset().await;
        self.quiz.reset().await;
    }
}

/// 触发端与查询端的一组实现
type Backends = (Arc<dyn TaskTrigger>, Arc<dyn StatusFetcher>);

/// LearningTasks 构建器
pub struct LearningTasksBuilder {
    config: AppConfig,
    credentials: Option<Arc<dyn CredentialSource>>,
    backends: Option<(Backends, Arc<dyn ChatBackend>)>,
}

impl LearningTasksBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            credentials: None,
            backends: None,
        }
    }

    /// 覆盖凭证来源（默认从 `api.token_env` 读取）
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// 所有任务类型共用给定的触发端与查询端，不再创建 HTTP 客户端
    pub fn with_backends(
        mut self,
        trigger: Arc<dyn TaskTrigger>,
        fetcher: Arc<dyn StatusFetcher>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        self.backends = Some(((trigger, fetcher), chat));
        self
    }

    pub fn build(self) -> Result<LearningTasks, TaskError> {
        let poll_config = PollConfig::try_from(&self.config.polling)?;

        let (agent, questions, quiz, chat) = match self.backends {
            Some(((trigger, fetcher), chat)) => {
                let make = |kind| {
                    TaskOrchestrator::new(kind, Arc::clone(&trigger), Arc::clone(&fetcher), poll_config)
                };
                (
                    make(TaskKind::Agent),
                    make(TaskKind::QuestionGeneration),
                    make(TaskKind::QuizAnalysis),
                    chat,
                )
            }
            None => {
                let api = &self.config.api;
                let credentials: Arc<dyn CredentialSource> = match self.credentials {
                    Some(c) => c,
                    None => Arc::new(EnvToken::new(api.token_env.clone())),
                };
                let client = ApiClient::new(&api.base_url, api.request_timeout_secs, credentials)
                    .map_err(|e| TaskError::InvalidInput(format!("cannot build API client: {e}")))?;
                tracing::info!(base_url = %client.base_url(), "Using learning platform API");

                let make = |kind| {
                    let endpoint = Arc::new(HttpTaskEndpoint::new(client.clone(), kind, &api.paths));
                    TaskOrchestrator::new(kind, endpoint.clone(), endpoint, poll_config)
                };
                let chat: Arc<dyn ChatBackend> =
                    Arc::new(HttpChatBackend::new(client.clone(), &api.paths));
                (
                    make(TaskKind::Agent),
                    make(TaskKind::QuestionGeneration),
                    make(TaskKind::QuizAnalysis),
                    chat,
                )
            }
        };

        Ok(LearningTasks {
            agent,
            questions,
            quiz,
            chat,
            config: self.config,
        })
    }
}
