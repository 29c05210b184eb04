//! 出站 HTTP 传输能力。
//!
//! 传输失败从不作为致命错误上抛：每次 POST 的结果归入封闭的
//! `PostOutcome` 集合，由调用方按重试/跳过策略处理。

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// 单次 HTTP POST 的归类结果。
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// 2xx，携带响应体。
    Success(String),
    /// 本地错误（请求构造或发送阶段的非连接类失败）。
    DeviceError(String),
    /// 认证失败（401/403）。
    AuthError,
    /// 连接失败或超时。
    ConnectionError(String),
    /// 其他未归类的 HTTP 状态码。
    UnknownStatus(u16),
}

impl PostOutcome {
    /// 按 HTTP 状态码归类（响应已到达的情况）。
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            200..=299 => PostOutcome::Success(body),
            401 | 403 => PostOutcome::AuthError,
            other => PostOutcome::UnknownStatus(other),
        }
    }
}

/// 传输层构造错误。
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http client error: {0}")]
    Client(String),
}

/// JSON POST 传输抽象。
#[async_trait]
pub trait JsonPoster: Send + Sync {
    async fn post_json(&self, url: &str, body: String) -> PostOutcome;
}

/// 基于 reqwest 的传输实现（附带应用密钥与附加请求头）。
#[derive(Clone)]
pub struct ReqwestPoster {
    client: reqwest::Client,
    app_key: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl ReqwestPoster {
    pub fn new(app_key: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            client,
            app_key: app_key.into(),
            extra_headers: Vec::new(),
        })
    }

    /// 附加一个固定请求头（例如标签更新的消息格式修订号）。
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }
}

#[async_trait]
impl JsonPoster for ReqwestPoster {
    async fn post_json(&self, url: &str, body: String) -> PostOutcome {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("appKey", &self.app_key);
        for (name, value) in &self.extra_headers {
            request = request.header(*name, value);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() || err.is_timeout() => {
                warn!(target: "twc.transport", url = url, error = %err, "http_post_connection_error");
                return PostOutcome::ConnectionError(err.to_string());
            }
            Err(err) => {
                warn!(target: "twc.transport", url = url, error = %err, "http_post_request_error");
                return PostOutcome::DeviceError(err.to_string());
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(target: "twc.transport", url = url, error = %err, "http_post_body_read_error");
                return PostOutcome::DeviceError(err.to_string());
            }
        };
        let outcome = PostOutcome::from_status(status, body);
        match &outcome {
            PostOutcome::AuthError => {
                warn!(target: "twc.transport", url = url, status = status, "http_post_auth_error");
            }
            PostOutcome::UnknownStatus(code) => {
                warn!(target: "twc.transport", url = url, status = *code, "http_post_unknown_status");
            }
            _ => {}
        }
        outcome
    }
}
