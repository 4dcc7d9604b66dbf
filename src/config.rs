//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `LEARNHUB__*` 覆盖（双下划线表示嵌套，如 `LEARNHUB__POLLING__INTERVAL_MS=500`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSection,
    pub polling: PollingSection,
    pub chat: ChatSection,
}

/// [api] 段：后端地址、令牌来源、请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    /// 读取 Bearer 令牌的环境变量名；每次请求时重新读取
    pub token_env: String,
    pub request_timeout_secs: u64,
    pub paths: PathsSection,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            token_env: "LEARNHUB_ACCESS_TOKEN".to_string(),
            request_timeout_secs: 30,
            paths: PathsSection::default(),
        }
    }
}

/// [api.paths] 段：各端点路径，`{task_id}` 为占位符
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub agent_start: String,
    pub agent_status: String,
    pub question_generate: String,
    pub question_status: String,
    pub quiz_analyze: String,
    pub quiz_status: String,
    pub chat: String,
    pub chat_history: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            agent_start: "/api/ai/v1/agents/start".to_string(),
            agent_status: "/api/ai/v1/agents/status/{task_id}".to_string(),
            question_generate: "/api/profile/v1/question".to_string(),
            question_status: "/api/profile/v1/question_result/{task_id}".to_string(),
            quiz_analyze: "/api/profile/v1/analyze_quiz".to_string(),
            quiz_status: "/api/profile/v1/analysis_result/{task_id}".to_string(),
            chat: "/api/ai/v1/chat".to_string(),
            chat_history: "/api/ai/v1/chat/history".to_string(),
        }
    }
}

/// [polling] 段：轮询次数上限与间隔（吞吐与延迟的权衡，按部署调整）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_ms: 2000,
        }
    }
}

/// [chat] 段：本地保留的对话轮数、拉取历史条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub max_history_turns: usize,
    pub history_limit: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_history_turns: 50,
            history_limit: 50,
        }
    }
}

/// 从 config 目录加载配置，环境变量 LEARNHUB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 LEARNHUB__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LEARNHUB")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
