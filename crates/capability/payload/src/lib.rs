//! 遥测批量能力：载荷缓冲与待发集合。

use domain::DataPoint;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// 载荷容量来源。每次插入都重新读取，允许运行期调整。
pub trait CapacitySource: Send + Sync {
    fn payload_max_data_points(&self) -> usize;
}

/// 固定容量（用于测试）。
#[derive(Debug)]
pub struct FixedCapacity(pub usize);

impl CapacitySource for FixedCapacity {
    fn payload_max_data_points(&self) -> usize {
        self.0
    }
}

/// 可运行期调整的容量。
#[derive(Debug)]
pub struct AtomicCapacity {
    max_data_points: AtomicUsize,
}

impl AtomicCapacity {
    pub fn new(initial: usize) -> Self {
        Self {
            max_data_points: AtomicUsize::new(initial),
        }
    }

    pub fn set(&self, value: usize) {
        self.max_data_points.store(value, Ordering::Relaxed);
    }
}

impl CapacitySource for AtomicCapacity {
    fn payload_max_data_points(&self) -> usize {
        self.max_data_points.load(Ordering::Relaxed)
    }
}

/// 一个大小受限、保持插入顺序的载荷。
/// 装满后隐式封口：后续数据点进入新载荷。
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    id: u64,
    data_points: Vec<DataPoint>,
}

impl Payload {
    /// 进程内唯一的载荷编号（确认发送时使用）。
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data_points(&self) -> &[DataPoint] {
        &self.data_points
    }

    pub fn len(&self) -> usize {
        self.data_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_points.is_empty()
    }
}

struct BufferState {
    pending: Vec<Payload>,
    next_payload_id: u64,
}

struct PayloadBufferInner {
    capacity: Arc<dyn CapacitySource>,
    state: Mutex<BufferState>,
}

/// 待发载荷缓冲。
///
/// 不变量：一条测量值恰好进入一个载荷；载荷在确认发送成功前一直保留；
/// 载荷按封口顺序排列；所有修改都经过同一把互斥锁。
#[derive(Clone)]
pub struct PayloadBuffer {
    inner: Arc<PayloadBufferInner>,
}

impl PayloadBuffer {
    pub fn new(capacity: Arc<dyn CapacitySource>) -> Self {
        Self {
            inner: Arc::new(PayloadBufferInner {
                capacity,
                state: Mutex::new(BufferState {
                    pending: Vec::new(),
                    next_payload_id: 0,
                }),
            }),
        }
    }

    /// 将数据点放入第一个有空位的载荷，没有则新建载荷。
    pub async fn add(&self, point: DataPoint) {
        let capacity = self.inner.capacity.payload_max_data_points().max(1);
        let mut state = self.inner.state.lock().await;
        if let Some(payload) = state
            .pending
            .iter_mut()
            .find(|payload| payload.data_points.len() < capacity)
        {
            payload.data_points.push(point);
            return;
        }
        let id = state.next_payload_id;
        state.next_payload_id = state.next_payload_id.wrapping_add(1);
        state.pending.push(Payload {
            id,
            data_points: vec![point],
        });
    }

    /// 批量放入数据点。
    pub async fn add_all(&self, points: Vec<DataPoint>) {
        for point in points {
            self.add(point).await;
        }
    }

    /// 当前待发载荷的独立副本，供投递任务遍历而不与后续插入竞争。
    pub async fn snapshot(&self) -> Vec<Payload> {
        let state = self.inner.state.lock().await;
        state.pending.clone()
    }

    /// 按编号移除已确认发送的载荷；载荷已不在时为幂等空操作。
    pub async fn confirm_sent(&self, payload_id: u64) {
        let mut state = self.inner.state.lock().await;
        state.pending.retain(|payload| payload.id != payload_id);
    }

    /// 当前待发载荷数量。
    pub async fn pending_len(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.pending.len()
    }
}
