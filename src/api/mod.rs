//! 学习平台 API 协作方：HTTP 客户端、凭证、各任务端点与模拟实现

pub mod client;
pub mod credentials;
pub mod endpoints;
pub mod mock;
pub mod traits;

pub use client::ApiClient;
pub use credentials::{CredentialSource, EnvToken, NoCredentials, SharedToken, StaticToken};
pub use endpoints::{HttpChatBackend, HttpTaskEndpoint};
pub use traits::{ChatBackend, TaskTrigger};
