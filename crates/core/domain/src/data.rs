/// 标签的数据类型。
///
/// `raw` 编码与设备固件的标签类型编号一致（遥测载荷的 `type` 字段）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDataType {
    Boolean,
    Float,
    Integer,
    Dword,
    Str,
}

impl TagDataType {
    /// 固件侧原始类型编号。
    pub fn raw(&self) -> i32 {
        match self {
            TagDataType::Boolean => 0,
            TagDataType::Float => 1,
            TagDataType::Integer => 2,
            TagDataType::Dword => 3,
            TagDataType::Str => 6,
        }
    }

    /// 线上格式使用的类型名（标签更新消息的 `type` 字段）。
    pub fn wire_name(&self) -> &'static str {
        match self {
            TagDataType::Boolean => "boolean",
            TagDataType::Float => "float",
            TagDataType::Integer => "integer",
            TagDataType::Dword => "dword",
            TagDataType::Str => "string",
        }
    }

    /// 按线上类型名解析。
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(TagDataType::Boolean),
            "float" => Some(TagDataType::Float),
            "integer" => Some(TagDataType::Integer),
            "dword" => Some(TagDataType::Dword),
            "string" => Some(TagDataType::Str),
            _ => None,
        }
    }
}

/// 标签值的数据类型。
#[derive(Debug, Clone, PartialEq)]
pub enum TagValueData {
    I32(i32),
    F64(f64),
    Bool(bool),
    Dword(u32),
    Str(String),
}

impl TagValueData {
    /// 值对应的标签数据类型。
    pub fn data_type(&self) -> TagDataType {
        match self {
            TagValueData::I32(_) => TagDataType::Integer,
            TagValueData::F64(_) => TagDataType::Float,
            TagValueData::Bool(_) => TagDataType::Boolean,
            TagValueData::Dword(_) => TagDataType::Dword,
            TagValueData::Str(_) => TagDataType::Str,
        }
    }

    /// 值的字符串形式（日志用）。
    pub fn display_string(&self) -> String {
        match self {
            TagValueData::I32(v) => v.to_string(),
            TagValueData::F64(v) => v.to_string(),
            TagValueData::Bool(v) => v.to_string(),
            TagValueData::Dword(v) => v.to_string(),
            TagValueData::Str(v) => v.clone(),
        }
    }
}

/// 从历史队列读出的单条测量值。读出后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub tag_name: String,
    pub value: TagValueData,
    pub quality: i32,
    pub ts_secs: i64,
}

impl DataPoint {
    pub fn new(
        tag_name: impl Into<String>,
        value: TagValueData,
        quality: i32,
        ts_secs: i64,
    ) -> Self {
        Self {
            tag_name: tag_name.into(),
            value,
            quality,
            ts_secs,
        }
    }
}
