//! 设备接口 Trait 定义
//!
//! - TagStore：按名字访问的标签读写原语
//! - HistorianQueue：历史数据队列的跨度读取与时间 tracker
//!
//! 设计原则：
//! - 单标签读写线程安全，但跨标签不具备事务性（没有多标签原子写）
//! - 所有接口返回 DeviceError
//! - 使用 async_trait 支持动态分发

use crate::error::DeviceError;
use crate::models::TagInfo;
use async_trait::async_trait;
use domain::{DataPoint, TagValueData};

/// 标签读写原语。
///
/// 每次调用是唯一的原子单位；调用方不得假设多标签写入的原子性。
#[async_trait]
pub trait TagStore: Send + Sync {
    /// 查找标签元信息；不存在返回 None。
    async fn find_tag(&self, name: &str) -> Result<Option<TagInfo>, DeviceError>;

    /// 读取标签当前值。
    async fn read_value(&self, name: &str) -> Result<TagValueData, DeviceError>;

    /// 写入标签当前值；值类型必须与标签类型一致。
    async fn write_value(&self, name: &str, value: &TagValueData) -> Result<(), DeviceError>;

    /// 创建标签（不存在时）；已存在则保留现值。
    async fn ensure_tag(&self, info: TagInfo, initial: TagValueData) -> Result<(), DeviceError>;
}

/// 历史数据队列接口。
#[async_trait]
pub trait HistorianQueue: Send + Sync {
    /// 时间 tracker 是否已存在。
    async fn time_tracker_exists(&self) -> Result<bool, DeviceError>;

    /// 读取下一个 FIFO 时间跨度内所有组的数据点。
    /// `start_new_tracker` 为 true 时从当前时间新建 tracker（接受历史间隙）。
    async fn read_next_span(&self, start_new_tracker: bool)
        -> Result<Vec<DataPoint>, DeviceError>;

    /// 当前滞后（毫秒）：带本地偏移的当前时间减 tracker 时间。
    async fn lag_millis(&self) -> Result<i64, DeviceError>;

    /// 将 tracker 前移过当前区间（显式接受数据丢失）。
    async fn advance_tracker(&self) -> Result<(), DeviceError>;

    /// 设置每次读取的时间跨度（分钟）。
    async fn set_span_minutes(&self, minutes: u64) -> Result<(), DeviceError>;

    /// 当前读取跨度（分钟）。
    async fn span_minutes(&self) -> Result<u64, DeviceError>;
}
