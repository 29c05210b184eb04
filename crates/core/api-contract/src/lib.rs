//! 连接器线上契约：遥测载荷与 JSON-RPC 标签更新消息。

pub mod jsonrpc;
pub mod telemetry;

pub use jsonrpc::{
    RemoteErrorBody, TagUpdateRequest, TagUpdateResponse, TagUpdateResponseBody, TagUpdateResult,
    TagValueUpdate,
};
pub use telemetry::{DatapointDto, TelemetryBody, TelemetryEnvelope, TelemetryInfo};

/// 标签更新消息要求的 JSON-RPC 协议版本。
pub const JSON_RPC_VERSION: &str = "2.0";

/// 标签更新请求携带的连接器消息格式修订号（`flexy-api-version` 头）。
/// 消息结构或内容变更时需要同步调整，供接收端识别与解码。
pub const TAG_UPDATE_API_VERSION: &str = "2021-4-29";

/// 线上格式错误。
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("json error: {0}")]
    Json(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("value error: {0}")]
    Value(String),
}
