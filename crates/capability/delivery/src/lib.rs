//! 投递能力：周期性发送待发载荷的后台任务。
//!
//! 至少一次语义：只有确认送达的载荷才会从待发集合移除，失败的载荷
//! 原样保留到下一轮，无退避、无合并、无限重试。

use api_contract::TelemetryEnvelope;
use domain::DeviceIdentity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use twc_payload::PayloadBuffer;
use twc_telemetry::{new_attempt_id, record_payload_send_failure, record_payload_send_success};
use twc_transport::{JsonPoster, PostOutcome};

/// 投递任务配置。
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub endpoint_url: String,
    pub send_interval: Duration,
}

/// 投递任务。
pub struct DeliveryWorker {
    buffer: PayloadBuffer,
    poster: Arc<dyn JsonPoster>,
    identity: DeviceIdentity,
    config: DeliveryConfig,
}

impl DeliveryWorker {
    pub fn new(
        buffer: PayloadBuffer,
        poster: Arc<dyn JsonPoster>,
        identity: DeviceIdentity,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            buffer,
            poster,
            identity,
            config,
        }
    }

    /// 单轮发送：快照 → 序列化 → 按封口顺序逐个发送 → 成功才确认。
    /// 单个载荷失败不阻塞本轮后续载荷。
    pub async fn run_cycle(&self) {
        let payloads = self.buffer.snapshot().await;
        if payloads.is_empty() {
            return;
        }
        debug!(
            target: "twc.delivery",
            pending = payloads.len(),
            "delivery_cycle_started"
        );
        for payload in payloads {
            let envelope =
                TelemetryEnvelope::from_data_points(payload.data_points(), &self.identity);
            let body = match envelope.to_json() {
                Ok(body) => body,
                Err(err) => {
                    record_payload_send_failure();
                    warn!(
                        target: "twc.delivery",
                        payload_id = payload.id(),
                        error = %err,
                        "payload_serialize_failed"
                    );
                    continue;
                }
            };
            let attempt_id = new_attempt_id();
            match self
                .poster
                .post_json(&self.config.endpoint_url, body)
                .await
            {
                PostOutcome::Success(_) => {
                    self.buffer.confirm_sent(payload.id()).await;
                    record_payload_send_success(payload.len() as u64);
                    info!(
                        target: "twc.delivery",
                        payload_id = payload.id(),
                        datapoints = payload.len(),
                        attempt_id = %attempt_id,
                        "payload_delivered"
                    );
                }
                outcome => {
                    record_payload_send_failure();
                    warn!(
                        target: "twc.delivery",
                        payload_id = payload.id(),
                        datapoints = payload.len(),
                        attempt_id = %attempt_id,
                        outcome = ?outcome,
                        "payload_send_failed"
                    );
                }
            }
        }
    }

    /// 启动长期投递任务。
    /// 停止标志每轮循环检查一次：关停延迟以一个发送周期为界，
    /// 进行中的发送不会被打断。
    pub fn spawn(self, stop: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.send_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                target: "twc.delivery",
                interval_ms = self.config.send_interval.as_millis() as u64,
                "delivery_worker_started"
            );
            loop {
                ticker.tick().await;
                if *stop.borrow() {
                    break;
                }
                self.run_cycle().await;
            }
            info!(target: "twc.delivery", "delivery_worker_stopped");
        })
    }
}
