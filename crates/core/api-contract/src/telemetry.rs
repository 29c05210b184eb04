//! 出站遥测载荷的精确线上格式。
//!
//! 外层信封固定为 `{"Tags":{"datapoints":[...],"info":{...}}}`，
//! 字段命名由云端接收服务决定，不做驼峰/下划线改写。

use crate::WireError;
use chrono::{FixedOffset, TimeZone, Utc};
use domain::{DataPoint, DeviceIdentity, TagValueData};
use serde::Serialize;

/// 遥测载荷外层信封。
#[derive(Debug, Serialize)]
pub struct TelemetryEnvelope {
    #[serde(rename = "Tags")]
    pub tags: TelemetryBody,
}

/// 信封内容：数据点数组加设备信息块。
#[derive(Debug, Serialize)]
pub struct TelemetryBody {
    pub datapoints: Vec<DatapointDto>,
    pub info: TelemetryInfo,
}

/// 单条数据点的线上表示。
#[derive(Debug, Serialize)]
pub struct DatapointDto {
    pub name: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub data_type: i32,
    pub quality: i32,
    pub timestamp: String,
}

/// 设备信息块。偏移量按历史格式以字符串传输。
#[derive(Debug, Serialize)]
pub struct TelemetryInfo {
    #[serde(rename = "ewon-name")]
    pub ewon_name: String,
    #[serde(rename = "ewon-utc-offset-millis")]
    pub ewon_utc_offset_millis: String,
}

impl TelemetryEnvelope {
    /// 由数据点切片与设备身份构造完整载荷。
    pub fn from_data_points(points: &[DataPoint], identity: &DeviceIdentity) -> Self {
        let datapoints = points
            .iter()
            .map(|point| DatapointDto {
                name: point.tag_name.clone(),
                value: wire_value(&point.value),
                data_type: point.value.data_type().raw(),
                quality: point.quality,
                timestamp: iso8601_with_offset(point.ts_secs, identity.utc_offset_millis),
            })
            .collect();
        Self {
            tags: TelemetryBody {
                datapoints,
                info: TelemetryInfo {
                    ewon_name: identity.device_name.clone(),
                    ewon_utc_offset_millis: identity.utc_offset_millis.to_string(),
                },
            },
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|err| WireError::Json(err.to_string()))
    }
}

fn wire_value(value: &TagValueData) -> serde_json::Value {
    match value {
        TagValueData::I32(v) => serde_json::Value::from(*v),
        TagValueData::F64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        TagValueData::Bool(v) => serde_json::Value::from(*v),
        TagValueData::Dword(v) => serde_json::Value::from(*v),
        TagValueData::Str(v) => serde_json::Value::from(v.clone()),
    }
}

/// 设备本地偏移下的 ISO-8601 时间戳。
/// 时间戳无法表示时退化为毫秒数字符串，载荷仍可发送。
fn iso8601_with_offset(ts_secs: i64, utc_offset_millis: i64) -> String {
    let offset_secs = (utc_offset_millis / 1000) as i32;
    let offset = FixedOffset::east_opt(offset_secs).or_else(|| FixedOffset::east_opt(0));
    match (Utc.timestamp_opt(ts_secs, 0).single(), offset) {
        (Some(utc), Some(offset)) => utc.with_timezone(&offset).to_rfc3339(),
        _ => (ts_secs.saturating_mul(1000)).to_string(),
    }
}
