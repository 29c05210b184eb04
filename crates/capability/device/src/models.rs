//! 设备层数据模型。

use domain::TagDataType;

/// 标签元信息。
#[derive(Debug, Clone)]
pub struct TagInfo {
    pub name: String,
    pub data_type: TagDataType,
    pub description: Option<String>,
}

impl TagInfo {
    pub fn new(name: impl Into<String>, data_type: TagDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
