//! 设备层错误类型
//!
//! 定义统一的设备访问错误，用于封装底层错误：
//! - 标签不存在或类型不符
//! - 历史队列读取失败
//! - 并发访问异常

#[derive(Debug)]
pub struct DeviceError {
    message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DeviceError {}
