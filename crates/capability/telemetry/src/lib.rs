//! 追踪初始化与连接器运行指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 运行指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub queue_polls: u64,
    pub queue_poll_retries: u64,
    pub queue_tracker_advances: u64,
    pub datapoints_read: u64,
    pub payload_send_success: u64,
    pub payload_send_failure: u64,
    pub datapoints_sent: u64,
    pub tag_updates_triggered: u64,
    pub tag_update_success: u64,
    pub tag_update_failure: u64,
    pub tag_update_rollbacks: u64,
}

/// 连接器运行指标（进程级）。
pub struct ConnectorMetrics {
    queue_polls: AtomicU64,
    queue_poll_retries: AtomicU64,
    queue_tracker_advances: AtomicU64,
    datapoints_read: AtomicU64,
    payload_send_success: AtomicU64,
    payload_send_failure: AtomicU64,
    datapoints_sent: AtomicU64,
    tag_updates_triggered: AtomicU64,
    tag_update_success: AtomicU64,
    tag_update_failure: AtomicU64,
    tag_update_rollbacks: AtomicU64,
}

impl ConnectorMetrics {
    pub fn new() -> Self {
        Self {
            queue_polls: AtomicU64::new(0),
            queue_poll_retries: AtomicU64::new(0),
            queue_tracker_advances: AtomicU64::new(0),
            datapoints_read: AtomicU64::new(0),
            payload_send_success: AtomicU64::new(0),
            payload_send_failure: AtomicU64::new(0),
            datapoints_sent: AtomicU64::new(0),
            tag_updates_triggered: AtomicU64::new(0),
            tag_update_success: AtomicU64::new(0),
            tag_update_failure: AtomicU64::new(0),
            tag_update_rollbacks: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_polls: self.queue_polls.load(Ordering::Relaxed),
            queue_poll_retries: self.queue_poll_retries.load(Ordering::Relaxed),
            queue_tracker_advances: self.queue_tracker_advances.load(Ordering::Relaxed),
            datapoints_read: self.datapoints_read.load(Ordering::Relaxed),
            payload_send_success: self.payload_send_success.load(Ordering::Relaxed),
            payload_send_failure: self.payload_send_failure.load(Ordering::Relaxed),
            datapoints_sent: self.datapoints_sent.load(Ordering::Relaxed),
            tag_updates_triggered: self.tag_updates_triggered.load(Ordering::Relaxed),
            tag_update_success: self.tag_update_success.load(Ordering::Relaxed),
            tag_update_failure: self.tag_update_failure.load(Ordering::Relaxed),
            tag_update_rollbacks: self.tag_update_rollbacks.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<ConnectorMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static ConnectorMetrics {
    METRICS.get_or_init(ConnectorMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成单次发送尝试的 trace_id。
pub fn new_attempt_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录一次历史队列轮询。
pub fn record_queue_poll() {
    metrics().queue_polls.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次队列读取重试。
pub fn record_queue_poll_retry() {
    metrics().queue_poll_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次跳过失败区间的 tracker 前移（显式数据丢失）。
pub fn record_queue_tracker_advance() {
    metrics()
        .queue_tracker_advances
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录从队列读出的数据点数。
pub fn record_datapoints_read(count: u64) {
    metrics().datapoints_read.fetch_add(count, Ordering::Relaxed);
}

/// 记录载荷发送成功与其中的数据点数。
pub fn record_payload_send_success(datapoints: u64) {
    metrics()
        .payload_send_success
        .fetch_add(1, Ordering::Relaxed);
    metrics()
        .datapoints_sent
        .fetch_add(datapoints, Ordering::Relaxed);
}

/// 记录载荷发送失败。
pub fn record_payload_send_failure() {
    metrics()
        .payload_send_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次标签更新触发。
pub fn record_tag_update_triggered() {
    metrics()
        .tag_updates_triggered
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录标签更新结果。
pub fn record_tag_update_result(success: bool) {
    if success {
        metrics().tag_update_success.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics().tag_update_failure.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录一次补偿回滚。
pub fn record_tag_update_rollback() {
    metrics()
        .tag_update_rollbacks
        .fetch_add(1, Ordering::Relaxed);
}
