//! LearnHub 命令行入口
//!
//! 触发 Agent / 题目生成 / 测验分析任务并轮询结果；Ctrl+C 取消正在进行的轮询。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use learnhub::config::load_config;
use learnhub::core::{
    LearningTasks, PollConfig, PollHandle, ProgressCallback, StatusSnapshot, TaskError, TaskKind,
    TaskOrchestrator, TaskRequest,
};
use learnhub::questionnaire::QuestionnaireFlow;

#[derive(Parser)]
#[command(name = "learnhub", about = "Drive long-running learning platform tasks", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an AI agent task and wait for its result
    Agent {
        /// Agent type, e.g. study_plan
        #[arg(value_name = "TYPE")]
        agent_type: String,

        /// Agent parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Print the task id and return without polling
        #[arg(long)]
        no_wait: bool,
    },

    /// Generate a questionnaire, optionally answer and submit it for analysis
    Questions {
        /// Answer as INDEX=TEXT (index starts at 0), repeatable
        #[arg(short, long, value_name = "INDEX=TEXT")]
        answer: Vec<String>,

        /// Submit the answers for analysis
        #[arg(long)]
        submit: bool,
    },

    /// Fetch the status of a task once
    Status {
        #[arg(value_enum)]
        kind: KindArg,
        task_id: String,
    },

    /// Poll a task until it finishes
    Poll {
        #[arg(value_enum)]
        kind: KindArg,
        task_id: String,

        /// Override the maximum number of status fetches
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override the delay between fetches in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Send a message to the AI tutor
    Chat {
        message: String,

        /// Load the server-side history before sending
        #[arg(long)]
        history: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Agent,
    Questions,
    Quiz,
}

impl From<KindArg> for TaskKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Agent => TaskKind::Agent,
            KindArg::Questions => TaskKind::QuestionGeneration,
            KindArg::Quiz => TaskKind::QuizAnalysis,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    learnhub::observability::init(cli.verbose);

    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let tasks = LearningTasks::from_config(cfg).context("Failed to set up API client")?;

    match cli.command {
        Command::Agent {
            agent_type,
            params,
            no_wait,
        } => {
            let params: Value = serde_json::from_str(&params).context("--params must be valid JSON")?;
            let handle = tasks
                .agent
                .start(TaskRequest::agent(agent_type, params))
                .await
                .context("Failed to start agent")?;
            println!("task_id: {}", handle.task_id());
            if !no_wait {
                let poll = tasks
                    .agent
                    .spawn_poll(handle.task_id(), Some(progress_printer()), None)
                    .await?;
                report(wait_or_interrupt(&tasks.agent, poll).await)?;
            }
        }
        Command::Questions { answer, submit } => {
            run_questionnaire(&tasks, &answer, submit).await?;
        }
        Command::Status { kind, task_id } => {
            let snapshot = tasks
                .orchestrator(kind.into())
                .check(&task_id)
                .await
                .context("Status check failed")?;
            println!("{}", serde_json::to_string_pretty(&snapshot.raw)?);
        }
        Command::Poll {
            kind,
            task_id,
            max_attempts,
            interval_ms,
        } => {
            let orchestrator = tasks.orchestrator(kind.into());
            let defaults = orchestrator.poll_config();
            let config = PollConfig::new(
                max_attempts.unwrap_or(defaults.max_attempts),
                interval_ms.unwrap_or(defaults.interval.as_millis() as u64),
            )?;
            let poll = orchestrator
                .spawn_poll(&task_id, Some(progress_printer()), Some(config))
                .await?;
            report(wait_or_interrupt(orchestrator, poll).await)?;
        }
        Command::Chat { message, history } => {
            let mut session = tasks.chat_session();
            if history {
                session
                    .load_history(tasks.chat.as_ref(), tasks.config.chat.history_limit)
                    .await
                    .context("Failed to load chat history")?;
                for msg in session.history() {
                    println!("[{:?}] {}", msg.role, msg.content);
                }
            }
            let reply = session
                .send_message(tasks.chat.as_ref(), &message)
                .await
                .context("Chat request failed")?;
            println!("{}", reply.response);
            for suggestion in &reply.suggestions {
                println!("  - {}", suggestion);
            }
        }
    }

    Ok(())
}

async fn run_questionnaire(tasks: &LearningTasks, answers: &[String], submit: bool) -> anyhow::Result<()> {
    let mut flow = QuestionnaireFlow::from_tasks(tasks);
    let generated = tokio::select! {
        r = flow.generate(Some(progress_printer())) => r,
        _ = tokio::signal::ctrl_c() => {
            tasks.questions.cancel().await;
            println!("cancelled");
            return Ok(());
        }
    };
    let questions = generated.context("Questionnaire generation failed")?;
    for (i, q) in questions.iter().enumerate() {
        println!("{}. [{:?}] {}", i, q.question_type, q.question);
        for option in &q.options {
            println!("     {}", option);
        }
    }

    for entry in answers {
        let (index, text) = entry
            .split_once('=')
            .with_context(|| format!("answer '{entry}' is not INDEX=TEXT"))?;
        let index: usize = index.trim().parse().with_context(|| format!("bad index in '{entry}'"))?;
        flow.set_answer(index, text)?;
    }

    if submit {
        if flow.answers().is_empty() {
            bail!("no answers given, use --answer INDEX=TEXT");
        }
        let analysis = flow.submit(Some(progress_printer())).await.context("Quiz analysis failed")?;
        if let Some(evaluation) = flow.evaluation() {
            println!("score: {} ({}%)", evaluation.score, evaluation.score_percentage);
        }
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    }
    Ok(())
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|snapshot: &StatusSnapshot| match snapshot.progress {
        Some(p) => eprintln!("  {:?} ({:.0}%)", snapshot.state, p),
        None => eprintln!("  {:?}", snapshot.state),
    })
}

async fn wait_or_interrupt(
    orchestrator: &TaskOrchestrator,
    poll: PollHandle,
) -> Option<Result<Value, TaskError>> {
    let outcome = poll.outcome();
    tokio::pin!(outcome);
    tokio::select! {
        r = &mut outcome => r,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel().await;
            tracing::warn!("Interrupted, poll cancelled");
            outcome.await
        }
    }
}

fn report(outcome: Option<Result<Value, TaskError>>) -> anyhow::Result<()> {
    match outcome {
        Some(Ok(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Some(Err(e)) if e.is_retryable() => bail!("{e} (retry later with `learnhub poll`)"),
        Some(Err(e)) => bail!(e),
        None => {
            println!("cancelled");
            Ok(())
        }
    }
}
