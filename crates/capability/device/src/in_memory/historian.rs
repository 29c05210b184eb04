//! 历史队列内存实现。
//!
//! 语义做了占位简化：一次跨度读取清空当前排队的数据点，tracker 推进到
//! 最后一条数据点（或当前时间）。需要精确区间控制的行为测试应使用
//! 各自的脚本化 mock。

use crate::error::DeviceError;
use crate::traits::HistorianQueue;
use domain::DataPoint;
use std::collections::VecDeque;
use std::sync::RwLock;

struct HistorianState {
    queued: VecDeque<DataPoint>,
    tracker_millis: Option<i64>,
    span_minutes: u64,
}

/// 历史队列内存存储。
pub struct InMemoryHistorianQueue {
    local_offset_millis: i64,
    state: RwLock<HistorianState>,
}

impl InMemoryHistorianQueue {
    pub fn new(span_minutes: u64, local_offset_millis: i64) -> Self {
        Self {
            local_offset_millis,
            state: RwLock::new(HistorianState {
                queued: VecDeque::new(),
                tracker_millis: None,
                span_minutes,
            }),
        }
    }

    /// 追加一条待读取的数据点（用于测试与演示接线）。
    pub fn push_data_point(&self, point: DataPoint) -> Result<(), DeviceError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        state.queued.push_back(point);
        Ok(())
    }

    /// 当前排队数量（用于测试）。
    pub fn queued_len(&self) -> usize {
        self.state.read().map(|state| state.queued.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl HistorianQueue for InMemoryHistorianQueue {
    async fn time_tracker_exists(&self) -> Result<bool, DeviceError> {
        let state = self
            .state
            .read()
            .map_err(|_| DeviceError::new("lock failed"))?;
        Ok(state.tracker_millis.is_some())
    }

    async fn read_next_span(
        &self,
        start_new_tracker: bool,
    ) -> Result<Vec<DataPoint>, DeviceError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        if start_new_tracker || state.tracker_millis.is_none() {
            // 新 tracker 从当前时间开始，之前排队的历史数据被跳过。
            state.queued.clear();
            state.tracker_millis = Some(now_epoch_millis());
            return Ok(Vec::new());
        }
        let drained: Vec<DataPoint> = state.queued.drain(..).collect();
        let tracker = drained
            .iter()
            .map(|point| point.ts_secs.saturating_mul(1000))
            .max()
            .unwrap_or_else(now_epoch_millis);
        state.tracker_millis = Some(tracker);
        Ok(drained)
    }

    async fn lag_millis(&self) -> Result<i64, DeviceError> {
        let state = self
            .state
            .read()
            .map_err(|_| DeviceError::new("lock failed"))?;
        let Some(tracker) = state.tracker_millis else {
            return Ok(0);
        };
        Ok((now_epoch_millis() + self.local_offset_millis - tracker).max(0))
    }

    async fn advance_tracker(&self) -> Result<(), DeviceError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        let span_millis = (state.span_minutes as i64).saturating_mul(60_000);
        let advanced = state
            .tracker_millis
            .map(|tracker| tracker + span_millis)
            .unwrap_or_else(now_epoch_millis);
        state.tracker_millis = Some(advanced.min(now_epoch_millis()));
        Ok(())
    }

    async fn set_span_minutes(&self, minutes: u64) -> Result<(), DeviceError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DeviceError::new("lock failed"))?;
        state.span_minutes = minutes;
        Ok(())
    }

    async fn span_minutes(&self) -> Result<u64, DeviceError> {
        let state = self
            .state
            .read()
            .map_err(|_| DeviceError::new("lock failed"))?;
        Ok(state.span_minutes)
    }
}

fn now_epoch_millis() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
