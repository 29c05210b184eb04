//! 标签内存实现。

use crate::error::DeviceError;
use crate::models::TagInfo;
use crate::traits::TagStore;
use domain::TagValueData;
use std::collections::HashMap;
use std::sync::RwLock;

struct TagRecord {
    info: TagInfo,
    value: TagValueData,
}

/// 标签内存存储。
pub struct InMemoryTagStore {
    tags: RwLock<HashMap<String, TagRecord>>,
}

impl InMemoryTagStore {
    /// 创建空的标签存储。
    pub fn new() -> Self {
        Self {
            tags: RwLock::new(HashMap::new()),
        }
    }

    /// 当前标签数量（用于测试）。
    pub fn len(&self) -> usize {
        self.tags.read().map(|tags| tags.len()).unwrap_or(0)
    }
}

impl Default for InMemoryTagStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TagStore for InMemoryTagStore {
    async fn find_tag(&self, name: &str) -> Result<Option<TagInfo>, DeviceError> {
        let tags = self
            .tags
            .read()
            .map_err(|_| DeviceError::new("lock failed"))?;
        Ok(tags.get(name).map(|record| record.info.clone()))
    }

    async fn read_value(&self, name: &str) -> Result<TagValueData, DeviceError> {
        let tags = self
            .tags
            .read()
            .map_err(|_| DeviceError::new("lock failed"))?;
        tags.get(name)
            .map(|record| record.value.clone())
            .ok_or_else(|| DeviceError::new(format!("tag not found: {name}")))
    }

    async fn write_value(&self, name: &str, value: &TagValueData) -> Result<(), DeviceError> {
        let mut tags = self
            .tags
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        let record = tags
            .get_mut(name)
            .ok_or_else(|| DeviceError::new(format!("tag not found: {name}")))?;
        if record.info.data_type != value.data_type() {
            return Err(DeviceError::new(format!(
                "tag {name}: value type {} does not match tag type {}",
                value.data_type().wire_name(),
                record.info.data_type.wire_name()
            )));
        }
        record.value = value.clone();
        Ok(())
    }

    async fn ensure_tag(&self, info: TagInfo, initial: TagValueData) -> Result<(), DeviceError> {
        let mut tags = self
            .tags
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        tags.entry(info.name.clone())
            .or_insert(TagRecord {
                info,
                value: initial,
            });
        Ok(())
    }
}
