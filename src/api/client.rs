//! 学习平台 HTTP 客户端
//!
//! 统一处理 base_url 拼接、JSON 头、Bearer 认证（每次请求重新读取令牌）与错误映射：
//! 网络失败 → Transport，非 2xx → Status，响应体不是 JSON → Decode。

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::api::CredentialSource;
use crate::core::ApiError;

/// 轻量 JSON 客户端，可廉价克隆（内部 Client 与凭证均为共享引用）
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialSource>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout_secs: u64,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.http.get(self.url(path))).await
    }

    pub async fn get_json_with_query(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        self.send(self.http.get(self.url(path)).query(query)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let mut request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "API request returned error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: error_detail(&body),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// 将 `{task_id}` 占位符替换为实际 id
pub fn fill_task_path(template: &str, task_id: &str) -> String {
    template.replace("{task_id}", task_id)
}

/// FastAPI 的错误体形如 `{"detail": "..."}`，取 detail；否则返回原文（截断）
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            Value::String(s) => s,
            other => other.to_string(),
        });
    match detail {
        Some(d) => d,
        None if body.len() > 300 => format!("{}...", body.chars().take(300).collect::<String>()),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NoCredentials;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/", 5, Arc::new(NoCredentials)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/x"), "http://localhost:8000/api/x");
        assert_eq!(client.url("api/x"), "http://localhost:8000/api/x");
    }

    #[test]
    fn test_fill_task_path() {
        assert_eq!(
            fill_task_path("/api/profile/v1/question_result/{task_id}", "abc"),
            "/api/profile/v1/question_result/abc"
        );
    }

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(error_detail(r#"{"detail": "Profile not found"}"#), "Profile not found");
        assert_eq!(error_detail("plain text"), "plain text");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:9", 2, Arc::new(NoCredentials)).unwrap();
        let err = client.get_json("/nothing").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
