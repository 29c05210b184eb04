//! 设备抽象能力：标签读写原语与历史队列接口。

pub mod error;
pub mod in_memory;
pub mod models;
pub mod traits;

pub use error::DeviceError;
pub use in_memory::{InMemoryHistorianQueue, InMemoryTagStore};
pub use models::TagInfo;
pub use traits::{HistorianQueue, TagStore};
