//! 历史队列轮询能力。
//!
//! 周期性从历史队列读取下一个时间跨度的数据点并送入载荷缓冲；
//! 读取速度落后于写入时把轮询跨度加倍以追平，失败区间按配置策略
//! 重试或跳过，内存不足时整轮跳过。

use domain::{TagDataType, TagValueData};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use twc_device::{DeviceError, HistorianQueue, TagInfo, TagStore};
use twc_payload::PayloadBuffer;
use twc_telemetry::{
    record_datapoints_read, record_queue_poll, record_queue_poll_retry,
    record_queue_tracker_advance,
};

/// 队列滞后秒数诊断标签。
pub const DIAG_TAG_BEHIND_SECONDS: &str = "TwcDiagQueueBehindSeconds";

/// 队列轮询次数诊断标签。
pub const DIAG_TAG_POLL_COUNT: &str = "TwcDiagQueuePollCount";

/// 时间 tracker 强制重置请求标签。
pub const DIAG_TAG_FORCE_RESET: &str = "TwcDiagQueueForceReset";

/// 队列读取失败策略。
///
/// 历史上存在两个修订（先重试后跳过 / 失败立即跳过），
/// 此处保留为显式配置项而不是默认选择其一。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFailurePolicy {
    /// 同一读取重试 N 次（线性退避），预算用尽后前移 tracker。
    RetryThenAdvance,
    /// 任意失败立即前移 tracker。
    AdvanceImmediately,
}

impl PollFailurePolicy {
    /// 按配置字符串解析。
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "retry-then-advance" => Some(Self::RetryThenAdvance),
            "advance-immediately" => Some(Self::AdvanceImmediately),
            _ => None,
        }
    }
}

/// 可用内存探测抽象。
pub trait MemoryProbe: Send + Sync {
    fn available_bytes(&self) -> u64;
}

/// 基于 sysinfo 的内存探测。
pub struct SysinfoMemoryProbe {
    system: std::sync::Mutex<sysinfo::System>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: std::sync::Mutex::new(sysinfo::System::new()),
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn available_bytes(&self) -> u64 {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();
        system.available_memory()
    }
}

/// 固定值内存探测（用于测试）。
#[derive(Debug)]
pub struct FixedMemoryProbe(pub u64);

impl MemoryProbe for FixedMemoryProbe {
    fn available_bytes(&self) -> u64 {
        self.0
    }
}

/// 轮询配置。
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 标称轮询跨度（分钟）。
    pub nominal_span_minutes: u64,
    /// 滞后告警阈值（毫秒），低于阈值按零处理。
    pub behind_warn_millis: i64,
    /// 轮询所需的最低可用内存（字节）。
    pub min_memory_bytes: u64,
    /// 读取失败策略。
    pub failure_policy: PollFailurePolicy,
    /// 失败策略为重试时的最大重试次数。
    pub max_retries: u32,
    /// 线性退避斜率（第 n 次重试前等待 n × slope）。
    pub retry_slope: Duration,
    /// 是否维护诊断标签。
    pub diagnostics_enabled: bool,
}

/// 队列轮询器。由主循环按配置的轮询周期驱动。
pub struct QueuePoller {
    historian: Arc<dyn HistorianQueue>,
    tags: Arc<dyn TagStore>,
    buffer: PayloadBuffer,
    probe: Arc<dyn MemoryProbe>,
    config: PollerConfig,
    poll_count: u32,
    doubled: bool,
    memory_low: bool,
}

impl QueuePoller {
    pub fn new(
        historian: Arc<dyn HistorianQueue>,
        tags: Arc<dyn TagStore>,
        buffer: PayloadBuffer,
        probe: Arc<dyn MemoryProbe>,
        config: PollerConfig,
    ) -> Self {
        Self {
            historian,
            tags,
            buffer,
            probe,
            config,
            poll_count: 0,
            doubled: false,
            memory_low: false,
        }
    }

    /// 已执行的轮询次数（回绕到零而不是溢出）。
    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// 启动时创建诊断标签（仅在启用诊断时）。已存在的标签保留现值。
    pub async fn ensure_diagnostic_tags(&self) {
        if !self.config.diagnostics_enabled {
            return;
        }
        let tags = [
            (
                TagInfo::new(DIAG_TAG_BEHIND_SECONDS, TagDataType::Dword)
                    .with_description("historical queue lag in seconds"),
                TagValueData::Dword(0),
            ),
            (
                TagInfo::new(DIAG_TAG_POLL_COUNT, TagDataType::Dword)
                    .with_description("historical queue poll count"),
                TagValueData::Dword(0),
            ),
            (
                TagInfo::new(DIAG_TAG_FORCE_RESET, TagDataType::Integer)
                    .with_description("request a new queue time tracker"),
                TagValueData::I32(0),
            ),
        ];
        for (info, initial) in tags {
            let name = info.name.clone();
            if let Err(err) = self.tags.ensure_tag(info, initial).await {
                warn!(
                    target: "twc.poller",
                    tag = %name,
                    error = %err,
                    "unable to create queue diagnostic tag"
                );
            }
        }
    }

    /// 单轮轮询。
    pub async fn run_cycle(&mut self) {
        // 内存低于下限时整轮跳过，避免读取中途分配失败。
        let available = self.probe.available_bytes();
        if available < self.config.min_memory_bytes {
            warn!(
                target: "twc.poller",
                available_kb = available / 1000,
                "low memory on device, skipping queue poll"
            );
            if !self.memory_low {
                self.memory_low = true;
                info!(target: "twc.poller", "memory_low_transition");
            }
            return;
        }
        if self.memory_low {
            self.memory_low = false;
        }

        self.poll_count = self.poll_count.wrapping_add(1);
        record_queue_poll();
        if self.config.diagnostics_enabled {
            self.write_diag_tag(DIAG_TAG_POLL_COUNT, TagValueData::Dword(self.poll_count))
                .await;
        }

        let force_reset = self.force_reset_requested().await;
        if force_reset {
            warn!(
                target: "twc.poller",
                tag = DIAG_TAG_FORCE_RESET,
                "a force reset of the queue has been requested, a new time tracker will be created at the current time"
            );
        }

        match self.read_span_with_policy(force_reset).await {
            Ok(points) => {
                if force_reset {
                    self.write_diag_tag(DIAG_TAG_FORCE_RESET, TagValueData::I32(0))
                        .await;
                }
                debug!(
                    target: "twc.poller",
                    count = points.len(),
                    "read data points from the historical log"
                );
                record_datapoints_read(points.len() as u64);
                self.buffer.add_all(points).await;
                self.update_lag_control().await;
            }
            Err(err) => {
                error!(
                    target: "twc.poller",
                    error = %err,
                    "reading from the historical log was unsuccessful, skipping to the next interval, data loss may result"
                );
                record_queue_tracker_advance();
                if let Err(err) = self.historian.advance_tracker().await {
                    error!(
                        target: "twc.poller",
                        error = %err,
                        "unable to advance the queue time tracker"
                    );
                }
            }
        }
    }

    /// 按失败策略执行跨度读取。
    async fn read_span_with_policy(
        &self,
        force_reset: bool,
    ) -> Result<Vec<domain::DataPoint>, DeviceError> {
        let max_attempts = match self.config.failure_policy {
            PollFailurePolicy::RetryThenAdvance => self.config.max_retries.saturating_add(1),
            PollFailurePolicy::AdvanceImmediately => 1,
        };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_read(force_reset).await {
                Ok(points) => {
                    if attempt > 1 {
                        info!(
                            target: "twc.poller",
                            attempt = attempt,
                            max_attempts = max_attempts,
                            "successfully retried reading from the historical log"
                        );
                    }
                    return Ok(points);
                }
                Err(err) => {
                    warn!(
                        target: "twc.poller",
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %err,
                        "an error occurred while reading from the historical log"
                    );
                    if attempt >= max_attempts {
                        return Err(err);
                    }
                    record_queue_poll_retry();
                    tokio::time::sleep(self.config.retry_slope * attempt).await;
                }
            }
        }
    }

    async fn try_read(&self, force_reset: bool) -> Result<Vec<domain::DataPoint>, DeviceError> {
        let tracker_exists = self.historian.time_tracker_exists().await?;
        let start_new_tracker = force_reset || !tracker_exists;
        self.historian.read_next_span(start_new_tracker).await
    }

    /// 滞后控制：告警、跨度加倍/恢复、诊断标签更新。
    async fn update_lag_control(&mut self) {
        let lag = match self.historian.lag_millis().await {
            Ok(lag) => lag,
            Err(err) => {
                warn!(
                    target: "twc.poller",
                    error = %err,
                    "unable to detect if the historical data queue is running behind"
                );
                return;
            }
        };
        // 低于告警阈值的滞后按零处理。
        let effective_lag = if lag >= self.config.behind_warn_millis {
            lag
        } else {
            0
        };

        if effective_lag > 0 {
            warn!(
                target: "twc.poller",
                behind_millis = lag,
                "the historical data queue is running behind"
            );
            if !self.doubled {
                let doubled_span = self.config.nominal_span_minutes * 2;
                match self.historian.set_span_minutes(doubled_span).await {
                    Ok(()) => {
                        warn!(
                            target: "twc.poller",
                            span_minutes = doubled_span,
                            "the queue poll span has been doubled while the queue is running behind"
                        );
                        self.doubled = true;
                    }
                    Err(err) => {
                        error!(
                            target: "twc.poller",
                            error = %err,
                            "unable to double the queue poll span"
                        );
                    }
                }
            }
        } else if self.doubled {
            match self
                .historian
                .set_span_minutes(self.config.nominal_span_minutes)
                .await
            {
                Ok(()) => {
                    info!(
                        target: "twc.poller",
                        span_minutes = self.config.nominal_span_minutes,
                        "the queue poll span has been restored"
                    );
                    self.doubled = false;
                }
                Err(err) => {
                    error!(
                        target: "twc.poller",
                        error = %err,
                        "unable to restore the queue poll span"
                    );
                }
            }
        }

        if self.config.diagnostics_enabled {
            let behind_seconds = (effective_lag / 1000).max(0) as u32;
            self.write_diag_tag(DIAG_TAG_BEHIND_SECONDS, TagValueData::Dword(behind_seconds))
                .await;
        }
    }

    async fn force_reset_requested(&self) -> bool {
        if !self.config.diagnostics_enabled {
            return false;
        }
        match self.tags.read_value(DIAG_TAG_FORCE_RESET).await {
            Ok(TagValueData::I32(value)) => value != 0,
            Ok(_) => false,
            Err(_) => false,
        }
    }

    async fn write_diag_tag(&self, name: &str, value: TagValueData) {
        if let Err(err) = self.tags.write_value(name, &value).await {
            error!(
                target: "twc.poller",
                tag = name,
                error = %err,
                "unable to set queue diagnostic tag value"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_known_values() {
        assert_eq!(
            PollFailurePolicy::parse("retry-then-advance"),
            Some(PollFailurePolicy::RetryThenAdvance)
        );
        assert_eq!(
            PollFailurePolicy::parse("advance-immediately"),
            Some(PollFailurePolicy::AdvanceImmediately)
        );
        assert_eq!(PollFailurePolicy::parse("give-up"), None);
    }
}
