//! 标签更新消息（JSON-RPC 2.0）的构造与模式校验解析。
//!
//! 解析是单次模式校验：要么得到完整类型化的响应对象，要么得到结构化的
//! `WireError`，业务逻辑在此之后才开始。响应中 `result` 与 `error`
//! 必须恰好出现一个。

use crate::{JSON_RPC_VERSION, WireError};
use domain::{TagDataType, TagValueData};
use serde::{Deserialize, Serialize};

/// 标签更新请求体。
#[derive(Debug, Clone, Serialize)]
pub struct TagUpdateRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: TagUpdateParams,
    pub id: String,
}

/// 请求参数：触发时捕获的自由文本信息。
#[derive(Debug, Clone, Serialize)]
pub struct TagUpdateParams {
    #[serde(rename = "stringInfo")]
    pub string_info: String,
}

impl TagUpdateRequest {
    pub fn new(
        method: impl Into<String>,
        string_info: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            method: method.into(),
            params: TagUpdateParams {
                string_info: string_info.into(),
            },
            id: id.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|err| WireError::Json(err.to_string()))
    }
}

/// 远端错误体。
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorBody {
    pub code: Option<i32>,
    pub message: Option<String>,
}

/// 模式校验通过后的类型化响应。
#[derive(Debug)]
pub struct TagUpdateResponse {
    pub jsonrpc: String,
    pub id: String,
    pub body: TagUpdateResponseBody,
}

/// 响应内容：结果与错误二选一。
#[derive(Debug)]
pub enum TagUpdateResponseBody {
    Result(TagUpdateResult),
    Error(RemoteErrorBody),
}

/// 结果分支：回滚开关与待应用的标签修改列表。
#[derive(Debug)]
pub struct TagUpdateResult {
    pub restore_previous_vals_on_fault: bool,
    pub tags: Vec<TagValueUpdate>,
}

/// 一条类型化的标签修改项。
#[derive(Debug, Clone, PartialEq)]
pub struct TagValueUpdate {
    pub name: String,
    pub data_type: TagDataType,
    pub value: TagValueData,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    jsonrpc: Option<String>,
    id: Option<String>,
    result: Option<RawResult>,
    error: Option<RemoteErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(rename = "restorePreviousValsOnFault", default)]
    restore_previous_vals_on_fault: bool,
    tags: Option<Vec<RawTagEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawTagEntry {
    name: Option<String>,
    #[serde(rename = "type")]
    tag_type: Option<String>,
    value: Option<serde_json::Value>,
}

impl TagUpdateResponse {
    /// 解析并校验响应体结构。
    pub fn from_json(body: &str) -> Result<Self, WireError> {
        let raw: RawResponse =
            serde_json::from_str(body).map_err(|err| WireError::Json(err.to_string()))?;
        let jsonrpc = raw
            .jsonrpc
            .ok_or_else(|| WireError::Schema("missing jsonrpc field".to_string()))?;
        let id = raw
            .id
            .ok_or_else(|| WireError::Schema("missing id field".to_string()))?;
        let body = match (raw.result, raw.error) {
            (Some(result), None) => {
                let entries = result
                    .tags
                    .ok_or_else(|| WireError::Schema("result missing tags field".to_string()))?;
                let mut tags = Vec::with_capacity(entries.len());
                for entry in entries {
                    tags.push(decode_entry(entry)?);
                }
                TagUpdateResponseBody::Result(TagUpdateResult {
                    restore_previous_vals_on_fault: result.restore_previous_vals_on_fault,
                    tags,
                })
            }
            (None, Some(error)) => TagUpdateResponseBody::Error(error),
            (Some(_), Some(_)) => {
                return Err(WireError::Schema(
                    "both result and error present".to_string(),
                ));
            }
            (None, None) => {
                return Err(WireError::Schema(
                    "neither result nor error present".to_string(),
                ));
            }
        };
        Ok(Self { jsonrpc, id, body })
    }
}

fn decode_entry(entry: RawTagEntry) -> Result<TagValueUpdate, WireError> {
    let name = entry
        .name
        .ok_or_else(|| WireError::Schema("tag entry missing name".to_string()))?;
    let type_name = entry
        .tag_type
        .ok_or_else(|| WireError::Schema(format!("tag entry {name} missing type")))?;
    let raw_value = entry
        .value
        .ok_or_else(|| WireError::Schema(format!("tag entry {name} missing value")))?;
    let data_type = TagDataType::from_wire_name(&type_name)
        .ok_or_else(|| WireError::Schema(format!("tag entry {name} has unknown type {type_name}")))?;
    let value = decode_value(&name, data_type, raw_value)?;
    Ok(TagValueUpdate {
        name,
        data_type,
        value,
    })
}

/// 按声明类型解码标签值；值与声明类型不一致属于消息格式错误。
fn decode_value(
    name: &str,
    data_type: TagDataType,
    raw: serde_json::Value,
) -> Result<TagValueData, WireError> {
    let mismatch = |expected: &str| {
        WireError::Value(format!("tag {name}: value is not a valid {expected}"))
    };
    match data_type {
        TagDataType::Integer => raw
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(TagValueData::I32)
            .ok_or_else(|| mismatch("integer")),
        TagDataType::Float => raw
            .as_f64()
            .map(TagValueData::F64)
            .ok_or_else(|| mismatch("float")),
        TagDataType::Boolean => raw
            .as_bool()
            .map(TagValueData::Bool)
            .ok_or_else(|| mismatch("boolean")),
        TagDataType::Dword => raw
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(TagValueData::Dword)
            .ok_or_else(|| mismatch("dword")),
        TagDataType::Str => raw
            .as_str()
            .map(|v| TagValueData::Str(v.to_string()))
            .ok_or_else(|| mismatch("string")),
    }
}
