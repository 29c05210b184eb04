pub mod data;

pub use data::{DataPoint, TagDataType, TagValueData};

/// 设备身份：遥测载荷 info 块与日志共享的执行上下文。
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_name: String,
    pub utc_offset_millis: i64,
}

impl DeviceIdentity {
    /// 按序列号构造设备身份（云端侧命名约定为 `FLEXY-<serial>`）。
    pub fn from_serial(serial: impl AsRef<str>, utc_offset_millis: i64) -> Self {
        Self {
            device_name: format!("FLEXY-{}", serial.as_ref()),
            utc_offset_millis,
        }
    }
}

impl Default for DeviceIdentity {
    /// 空身份（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            device_name: "FLEXY-invalid".to_string(),
            utc_offset_millis: 0,
        }
    }
}
