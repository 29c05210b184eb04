//! 连接器运行时：装配各能力模块并驱动主循环。
//!
//! 三条逻辑控制流：队列轮询器在主循环内按周期执行；投递任务是启动时
//! 创建的长期后台任务，经停止标志协作式关停；标签更新由触发监视任务
//! 检测、监听任务串行处理。三者只通过载荷缓冲（互斥保护）和设备标签
//! 原语交互。

use api_contract::TAG_UPDATE_API_VERSION;
use domain::{DeviceIdentity, TagDataType, TagValueData};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use twc_config::AppConfig;
use twc_delivery::{DeliveryConfig, DeliveryWorker};
use twc_device::{HistorianQueue, InMemoryHistorianQueue, InMemoryTagStore, TagInfo, TagStore};
use twc_payload::{AtomicCapacity, PayloadBuffer};
use twc_poller::{
    PollFailurePolicy, PollerConfig, QueuePoller, SysinfoMemoryProbe,
};
use twc_tagupdate::{
    TagUpdateConfig, TagUpdateService, spawn_trigger_listener, spawn_trigger_watcher,
};
use twc_telemetry::init_tracing;
use twc_transport::ReqwestPoster;

/// 连接器名称（启动/退出日志）。
const CONNECTOR_NAME: &str = "Flexy ThingWorx Connector";

/// 连接器控制标签：保持运行值时主循环继续执行。
const CONTROL_TAG_NAME: &str = "TwcConnectorControl";

/// 允许连接器运行的控制标签取值。
const CONTROL_TAG_RUN_VALUE: i32 = 0;

/// 主循环节拍（毫秒）。需小于队列轮询周期。
const MAIN_LOOP_CYCLE_MILLIS: u64 = 1_000;

/// 触发标签的轮询节拍（毫秒）。
const TRIGGER_POLL_MILLIS: u64 = 500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志
    init_tracing();
    // 从环境变量加载运行配置（缺失项回退默认值）
    let config = AppConfig::from_env();

    info!(
        target: "twc.agent",
        version = env!("CARGO_PKG_VERSION"),
        "starting {CONNECTOR_NAME}"
    );

    let identity = DeviceIdentity::from_serial(&config.device_serial, config.utc_offset_millis);
    info!(
        target: "twc.agent",
        device_name = %identity.device_name,
        utc_offset_millis = identity.utc_offset_millis,
        "device_identity_resolved"
    );

    // 设备侧协作方。真实部署由固件的标签库与历史库提供，
    // 此处接线内存实现。
    let tags: Arc<dyn TagStore> = Arc::new(InMemoryTagStore::new());
    let historian: Arc<dyn HistorianQueue> = Arc::new(InMemoryHistorianQueue::new(
        config.queue_poll_span_minutes,
        config.utc_offset_millis,
    ));

    // 连接器控制标签
    if let Err(err) = tags
        .ensure_tag(
            TagInfo::new(CONTROL_TAG_NAME, TagDataType::Integer)
                .with_description("connector run/stop control"),
            TagValueData::I32(CONTROL_TAG_RUN_VALUE),
        )
        .await
    {
        warn!(
            target: "twc.agent",
            tag = CONTROL_TAG_NAME,
            error = %err,
            "unable to create the connector control tag, the connector cannot be stopped via tag"
        );
    }

    // 载荷缓冲：容量每次插入时从容量源重新读取
    let buffer = PayloadBuffer::new(Arc::new(AtomicCapacity::new(
        config.payload_max_data_points,
    )));

    // 出站传输
    let http_timeout = Duration::from_secs(config.http_timeout_seconds);
    let telemetry_poster = Arc::new(ReqwestPoster::new(config.app_key.clone(), http_timeout)?);

    // 投递任务（长期后台任务，协作式停止）
    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = DeliveryWorker::new(
        buffer.clone(),
        telemetry_poster,
        identity.clone(),
        DeliveryConfig {
            endpoint_url: config.cloud_endpoint_url.clone(),
            send_interval: Duration::from_millis(config.payload_send_interval_millis),
        },
    );
    let worker_handle = worker.spawn(stop_rx.clone());

    // 远程标签更新（仅在配置了端点时启用）
    let mut tag_update_handles = Vec::new();
    match config.tag_update_url.clone() {
        Some(tag_update_url) => {
            let tag_update_poster = Arc::new(
                ReqwestPoster::new(config.app_key.clone(), http_timeout)?
                    .with_header("flexy-api-version", TAG_UPDATE_API_VERSION),
            );
            let service = Arc::new(TagUpdateService::new(
                tags.clone(),
                tag_update_poster,
                TagUpdateConfig {
                    endpoint_url: tag_update_url,
                },
            ));
            service.ensure_protocol_tags().await;
            let (event_tx, event_rx) = mpsc::channel(8);
            tag_update_handles.push(spawn_trigger_watcher(
                tags.clone(),
                event_tx,
                Duration::from_millis(TRIGGER_POLL_MILLIS),
                stop_rx.clone(),
            ));
            tag_update_handles.push(spawn_trigger_listener(service, event_rx));
        }
        None => {
            info!(
                target: "twc.agent",
                "the tag update URL has not been configured, remote tag updates are disabled"
            );
        }
    }

    // 队列轮询器
    let failure_policy = PollFailurePolicy::parse(&config.queue_poll_failure_policy)
        .unwrap_or_else(|| {
            warn!(
                target: "twc.agent",
                value = %config.queue_poll_failure_policy,
                "unknown queue poll failure policy, using retry-then-advance"
            );
            PollFailurePolicy::RetryThenAdvance
        });
    let mut poller = QueuePoller::new(
        historian.clone(),
        tags.clone(),
        buffer.clone(),
        Arc::new(SysinfoMemoryProbe::new()),
        PollerConfig {
            nominal_span_minutes: config.queue_poll_span_minutes,
            behind_warn_millis: config.queue_behind_warn_millis,
            min_memory_bytes: config.queue_poll_min_memory_bytes,
            failure_policy,
            max_retries: config.queue_poll_max_retries,
            retry_slope: Duration::from_millis(config.queue_poll_retry_slope_millis),
            diagnostics_enabled: config.queue_diagnostic_tags_enabled,
        },
    );
    poller.ensure_diagnostic_tags().await;

    // 主循环：固定节拍，按配置周期轮询队列，控制标签每拍检查一次。
    let poll_interval = Duration::from_millis(config.queue_poll_interval_millis);
    let mut last_poll: Option<tokio::time::Instant> = None;
    let mut is_running = true;
    while is_running {
        let now = tokio::time::Instant::now();
        let poll_due = match last_poll {
            Some(last) => now.duration_since(last) >= poll_interval,
            None => true,
        };
        if poll_due {
            poller.run_cycle().await;
            last_poll = Some(now);
        }

        tokio::time::sleep(Duration::from_millis(MAIN_LOOP_CYCLE_MILLIS)).await;

        is_running = match tags.read_value(CONTROL_TAG_NAME).await {
            Ok(TagValueData::I32(value)) => value == CONTROL_TAG_RUN_VALUE,
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target: "twc.agent",
                    tag = CONTROL_TAG_NAME,
                    error = %err,
                    "unable to read the connector control tag"
                );
                true
            }
        };
    }

    // 协作式关停：置位停止标志，等待后台任务自行退出。
    info!(
        target: "twc.agent",
        "shutdown requested via the connector control tag"
    );
    let _ = stop_tx.send(true);
    if let Err(err) = worker_handle.await {
        error!(target: "twc.agent", error = %err, "delivery worker ended abnormally");
    }
    for handle in tag_update_handles {
        if let Err(err) = handle.await {
            error!(target: "twc.agent", error = %err, "tag update task ended abnormally");
        }
    }

    info!(
        target: "twc.agent",
        version = env!("CARGO_PKG_VERSION"),
        "finished running {CONNECTOR_NAME}"
    );
    Ok(())
}
