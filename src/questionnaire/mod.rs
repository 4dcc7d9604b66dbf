//! 定位问卷：生成题目、作答、本地评分、提交分析
//!
//! 题目生成与测验分析各自是一个服务端异步任务，分别由对应的 [`TaskOrchestrator`] 驱动。

pub mod evaluation;
pub mod payload;

use std::collections::HashMap;

use serde_json::Value;

use crate::core::{LearningTasks, ProgressCallback, TaskError, TaskKind, TaskOrchestrator, TaskRequest};

pub use evaluation::{answer_key, evaluate, AnswerRecord, EvaluationResult, Verdict};
pub use payload::{parse_questions_payload, Correction, Question, QuestionType};

/// 一次问卷的完整流程
pub struct QuestionnaireFlow {
    generator: TaskOrchestrator,
    analyzer: TaskOrchestrator,
    questions: Vec<Question>,
    answers: HashMap<String, String>,
    evaluation: Option<EvaluationResult>,
    analysis: Option<Value>,
}

impl QuestionnaireFlow {
    pub fn new(generator: TaskOrchestrator, analyzer: TaskOrchestrator) -> Result<Self, TaskError> {
        if generator.kind() != TaskKind::QuestionGeneration || analyzer.kind() != TaskKind::QuizAnalysis {
            return Err(TaskError::InvalidInput(format!(
                "questionnaire needs {} and {} orchestrators, got {} and {}",
                TaskKind::QuestionGeneration,
                TaskKind::QuizAnalysis,
                generator.kind(),
                analyzer.kind()
            )));
        }
        Ok(Self {
            generator,
            analyzer,
            questions: Vec::new(),
            answers: HashMap::new(),
            evaluation: None,
            analysis: None,
        })
    }

    pub fn from_tasks(tasks: &LearningTasks) -> Self {
        Self {
            generator: tasks.questions.clone(),
            analyzer: tasks.quiz.clone(),
            questions: Vec::new(),
            answers: HashMap::new(),
            evaluation: None,
            analysis: None,
        }
    }

    /// 触发题目生成并等待结果；结果中解析不出题目视为任务失败
    pub async fn generate(&mut self, on_progress: Option<ProgressCallback>) -> Result<&[Question], TaskError> {
        self.clear_local();
        let handle = self.generator.start(TaskRequest::QuestionGeneration).await?;
        let payload = self
            .generator
            .poll_until_done(handle.task_id(), on_progress, None)
            .await?;

        let questions = parse_questions_payload(&payload)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| TaskError::TaskFailed("no questions found in generation result".to_string()))?;
        tracing::info!(task_id = %handle.task_id(), count = questions.len(), "Questionnaire ready");
        self.questions = questions;
        Ok(&self.questions)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// 记录第 index 题（从 0 开始）的答案
    pub fn set_answer(&mut self, index: usize, answer: impl Into<String>) -> Result<(), TaskError> {
        if index >= self.questions.len() {
            return Err(TaskError::InvalidInput(format!(
                "question index {index} out of range ({} questions)",
                self.questions.len()
            )));
        }
        self.answers.insert(answer_key(index), answer.into());
        Ok(())
    }

    pub fn answers(&self) -> &HashMap<String, String> {
        &self.answers
    }

    /// 所有题目都有非空白答案
    pub fn all_answered(&self) -> bool {
        !self.questions.is_empty()
            && (0..self.questions.len()).all(|i| {
                self.answers
                    .get(&answer_key(i))
                    .map(|a| !a.trim().is_empty())
                    .unwrap_or(false)
            })
    }

    /// 本地评分后提交测验分析，等待分析结果
    pub async fn submit(&mut self, on_progress: Option<ProgressCallback>) -> Result<Value, TaskError> {
        if self.questions.is_empty() {
            return Err(TaskError::InvalidInput("no questionnaire to submit".to_string()));
        }
        let result = evaluate(&self.questions, &self.answers);
        let body = serde_json::to_value(&result)
            .map_err(|e| TaskError::InvalidInput(format!("cannot encode evaluation: {e}")))?;
        tracing::info!(score = %result.score, percentage = result.score_percentage, "Submitting quiz for analysis");
        self.evaluation = Some(result);

        let handle = self
            .analyzer
            .start(TaskRequest::QuizAnalysis { evaluation: body })
            .await?;
        let analysis = self
            .analyzer
            .poll_until_done(handle.task_id(), on_progress, None)
            .await?;
        self.analysis = Some(analysis.clone());
        Ok(analysis)
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn analysis(&self) -> Option<&Value> {
        self.analysis.as_ref()
    }

    /// 清空题目、答案与两个任务会话
    pub async fn reset(&mut self) {
        self.clear_local();
        self.generator.reset().await;
        self.analyzer.reset().await;
    }

    fn clear_local(&mut self) {
        self.questions.clear();
        self.answers.clear();
        self.evaluation = None;
        self.analysis = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::api::mock::{MockChatBackend, MockTrigger, ScriptedStatusFetcher};
    use crate::config::AppConfig;
    use crate::core::builder::LearningTasksBuilder;
    use crate::core::{StatusSnapshot, TaskState};

    fn tasks(script: Vec<StatusSnapshot>) -> (LearningTasks, Arc<MockTrigger>) {
        let mut config = AppConfig::default();
        config.polling.interval_ms = 10;
        config.polling.max_attempts = 3;
        let trigger = Arc::new(MockTrigger::new());
        let tasks = LearningTasksBuilder::new(config)
            .with_backends(
                trigger.clone(),
                Arc::new(ScriptedStatusFetcher::new(script.into_iter().map(Ok).collect())),
                Arc::new(MockChatBackend::new()),
            )
            .build()
            .unwrap();
        (tasks, trigger)
    }

    fn generated() -> StatusSnapshot {
        StatusSnapshot::success(json!({
            "json": [
                {"numero": 1, "question": "Capital of France?", "type": "ChoixMultiple", "correction": "B. Paris"},
                {"numero": 2, "question": "Why study?", "type": "QuestionOuverte"}
            ]
        }))
    }

    #[tokio::test]
    async fn test_generate_answer_submit() {
        let (tasks, trigger) = tasks(vec![generated(), StatusSnapshot::success(json!({"niveau_final": 3}))]);
        let mut flow = QuestionnaireFlow::from_tasks(&tasks);

        assert_eq!(flow.generate(None).await.unwrap().len(), 2);
        flow.set_answer(0, "B").unwrap();
        assert!(!flow.all_answered());
        flow.set_answer(1, "to learn").unwrap();
        assert!(flow.all_answered());
        assert!(flow.set_answer(5, "x").is_err());

        let analysis = flow.submit(None).await.unwrap();
        assert_eq!(analysis, json!({"niveau_final": 3}));
        assert_eq!(flow.evaluation().unwrap().score, "1/1");

        let requests = trigger.requests();
        assert_eq!(requests.len(), 2);
        match &requests[1] {
            TaskRequest::QuizAnalysis { evaluation } => {
                assert_eq!(evaluation["score"], json!("1/1"));
                assert_eq!(evaluation["questions_data"][1]["is_correct"], json!("Non évalué (requiert une analyse humaine)"));
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert_eq!(tasks.quiz.view().await.status, Some(TaskState::Success));
    }

    #[tokio::test]
    async fn test_empty_generation_is_task_failure() {
        let (tasks, _) = tasks(vec![StatusSnapshot::success(json!({"json": "nothing here"}))]);
        let mut flow = QuestionnaireFlow::from_tasks(&tasks);
        let err = flow.generate(None).await.unwrap_err();
        assert!(matches!(err, TaskError::TaskFailed(_)));
        assert!(flow.questions().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_questions_is_rejected() {
        let (tasks, trigger) = tasks(vec![generated()]);
        let mut flow = QuestionnaireFlow::from_tasks(&tasks);
        assert!(matches!(flow.submit(None).await, Err(TaskError::InvalidInput(_))));
        assert_eq!(trigger.calls(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (tasks, _) = tasks(vec![generated()]);
        let mut flow = QuestionnaireFlow::from_tasks(&tasks);
        flow.generate(None).await.unwrap();
        flow.set_answer(0, "B").unwrap();

        flow.reset().await;
        assert!(flow.questions().is_empty());
        assert!(flow.answers().is_empty());
        assert!(tasks.questions.view().await.task_id.is_none());
    }

    #[test]
    fn test_new_checks_orchestrator_kinds() {
        let (tasks, _) = tasks(vec![]);
        assert!(QuestionnaireFlow::new(tasks.quiz.clone(), tasks.questions.clone()).is_err());
        assert!(QuestionnaireFlow::new(tasks.questions.clone(), tasks.quiz.clone()).is_ok());
    }
}
