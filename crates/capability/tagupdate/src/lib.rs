//! 远程标签更新能力。
//!
//! 由本地触发标签驱动：触发监视任务在触发标签离开 0 值的边沿捕获
//! 信息串并发出事件，监听任务串行消费事件，逐个完成
//! 请求 → 响应校验 → 两阶段应用 的完整周期，最终结果写回结果标签。

pub mod apply;

use api_contract::{
    JSON_RPC_VERSION, TagUpdateRequest, TagUpdateResponse, TagUpdateResponseBody,
};
use apply::{ApplyOutcome, apply_tag_updates};
use domain::{TagDataType, TagValueData};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use twc_device::{TagInfo, TagStore};
use twc_telemetry::{record_tag_update_result, record_tag_update_triggered};
use twc_transport::{JsonPoster, PostOutcome};

/// 远程标签更新触发标签（整数枚举）。
pub const TRIGGER_TAG_NAME: &str = "RemoteTagUpdateTriggerEnum";

/// 触发时附带的自由文本信息标签。
pub const TRIGGER_INFO_TAG_NAME: &str = "RemoteTagUpdateTriggerString";

/// 结果指示标签（整数枚举）。
pub const RESULT_TAG_NAME: &str = "RemoteTagUpdateResultEnum";

/// 无触发时触发标签的取值。
pub const TRIGGER_VALUE_NONE: i32 = 0;

/// 标签更新周期的结果指示。
///
/// 结果标签存储 `raw()` 的整数编码；触发时复位为 `Initial`，
/// 终值保留到下一次触发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Initial,
    HttpStarted,
    Success,
    ConnectionError,
    DeviceError,
    VerifyFail,
    ApplyFail,
    MissingTags,
    TypeMismatch,
    /// 远端返回的错误码，原样透传到结果标签。
    RemoteError(i32),
}

impl UpdateOutcome {
    /// 写入结果标签的整数编码。
    pub fn raw(&self) -> i32 {
        match self {
            UpdateOutcome::Initial => 0,
            UpdateOutcome::HttpStarted => 1,
            UpdateOutcome::Success => 2,
            UpdateOutcome::ConnectionError => 3,
            UpdateOutcome::DeviceError => 4,
            UpdateOutcome::VerifyFail => 5,
            UpdateOutcome::ApplyFail => 6,
            UpdateOutcome::MissingTags => 7,
            UpdateOutcome::TypeMismatch => 8,
            UpdateOutcome::RemoteError(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Success)
    }
}

/// 一次触发事件：触发值与同一时刻捕获的信息串。
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub trigger_value: i32,
    pub info: String,
}

/// 标签更新服务配置。
#[derive(Debug, Clone)]
pub struct TagUpdateConfig {
    pub endpoint_url: String,
}

/// 标签更新服务。
///
/// 请求严格串行：事件由单一监听任务逐个消费，处理期间出现的新触发
/// 在通道里排队，不会交错。
pub struct TagUpdateService {
    tags: Arc<dyn TagStore>,
    poster: Arc<dyn JsonPoster>,
    config: TagUpdateConfig,
    request_id_counter: AtomicU64,
}

impl TagUpdateService {
    pub fn new(
        tags: Arc<dyn TagStore>,
        poster: Arc<dyn JsonPoster>,
        config: TagUpdateConfig,
    ) -> Self {
        Self {
            tags,
            poster,
            config,
            request_id_counter: AtomicU64::new(0),
        }
    }

    /// 启动时创建触发/信息/结果标签（已存在则保留现值），并把触发信号
    /// 复位到无触发状态。
    pub async fn ensure_protocol_tags(&self) {
        let tags = [
            (
                TagInfo::new(TRIGGER_TAG_NAME, TagDataType::Integer)
                    .with_description("remote tag update trigger"),
                TagValueData::I32(TRIGGER_VALUE_NONE),
            ),
            (
                TagInfo::new(TRIGGER_INFO_TAG_NAME, TagDataType::Str)
                    .with_description("remote tag update trigger info"),
                TagValueData::Str(String::new()),
            ),
            (
                TagInfo::new(RESULT_TAG_NAME, TagDataType::Integer)
                    .with_description("remote tag update result"),
                TagValueData::I32(UpdateOutcome::Initial.raw()),
            ),
        ];
        for (info, initial) in tags {
            let name = info.name.clone();
            if let Err(err) = self.tags.ensure_tag(info, initial).await {
                warn!(
                    target: "twc.tagupdate",
                    tag = %name,
                    error = %err,
                    "unable to create a tag update protocol tag"
                );
            }
        }
        reset_trigger_signals(self.tags.as_ref()).await;
    }

    /// 处理一次触发：完整执行请求、校验与应用，返回并写回最终结果。
    pub async fn process_trigger(&self, event: TriggerEvent) -> UpdateOutcome {
        record_tag_update_triggered();
        let request_id = self
            .request_id_counter
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        info!(
            target: "twc.tagupdate",
            request_id = %request_id,
            trigger_value = event.trigger_value,
            "tag_update_started"
        );
        let request = TagUpdateRequest::new(
            event.trigger_value.to_string(),
            event.info,
            request_id.clone(),
        );
        let outcome = self.execute(request, &request_id).await;
        self.write_result(outcome).await;
        record_tag_update_result(outcome.is_success());
        info!(
            target: "twc.tagupdate",
            request_id = %request_id,
            outcome = ?outcome,
            raw = outcome.raw(),
            "tag_update_completed"
        );
        outcome
    }

    async fn execute(&self, request: TagUpdateRequest, request_id: &str) -> UpdateOutcome {
        let body = match request.to_json() {
            Ok(body) => body,
            Err(err) => {
                error!(
                    target: "twc.tagupdate",
                    error = %err,
                    "unable to build a tag update request message"
                );
                return UpdateOutcome::DeviceError;
            }
        };

        self.write_result(UpdateOutcome::HttpStarted).await;
        let response_body = match self.poster.post_json(&self.config.endpoint_url, body).await {
            PostOutcome::Success(response_body) => response_body,
            PostOutcome::AuthError => {
                warn!(target: "twc.tagupdate", "tag update request failed with an authentication error");
                return UpdateOutcome::ConnectionError;
            }
            PostOutcome::ConnectionError(message) => {
                warn!(
                    target: "twc.tagupdate",
                    error = %message,
                    "tag update request failed with a connection error"
                );
                return UpdateOutcome::ConnectionError;
            }
            PostOutcome::DeviceError(message) => {
                error!(
                    target: "twc.tagupdate",
                    error = %message,
                    "an error occurred while performing the tag update request"
                );
                return UpdateOutcome::DeviceError;
            }
            PostOutcome::UnknownStatus(status) => {
                warn!(
                    target: "twc.tagupdate",
                    status = status,
                    "tag update request returned an unexpected status, response cannot be verified"
                );
                return UpdateOutcome::VerifyFail;
            }
        };
        debug!(
            target: "twc.tagupdate",
            body_len = response_body.len(),
            "tag_update_response_received"
        );

        let response = match TagUpdateResponse::from_json(&response_body) {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    target: "twc.tagupdate",
                    error = %err,
                    "tag update response failed schema validation and will not be processed"
                );
                return UpdateOutcome::VerifyFail;
            }
        };

        // 校验顺序：消息 ID → 协议版本（result/error 互斥已在解析时保证）。
        if response.id != request_id {
            warn!(
                target: "twc.tagupdate",
                expected = %request_id,
                got = %response.id,
                "tag update response has a mismatched id and will not be processed"
            );
            return UpdateOutcome::VerifyFail;
        }
        if response.jsonrpc != JSON_RPC_VERSION {
            warn!(
                target: "twc.tagupdate",
                expected = JSON_RPC_VERSION,
                got = %response.jsonrpc,
                "tag update response has a mismatched protocol version and will not be processed"
            );
            return UpdateOutcome::VerifyFail;
        }

        match response.body {
            TagUpdateResponseBody::Error(remote_error) => {
                warn!(
                    target: "twc.tagupdate",
                    code = ?remote_error.code,
                    message = remote_error.message.as_deref().unwrap_or(""),
                    "tag update response returned an error"
                );
                match remote_error.code {
                    Some(code) => UpdateOutcome::RemoteError(code),
                    None => UpdateOutcome::VerifyFail,
                }
            }
            TagUpdateResponseBody::Result(result) => {
                match apply_tag_updates(
                    self.tags.as_ref(),
                    &result.tags,
                    result.restore_previous_vals_on_fault,
                )
                .await
                {
                    ApplyOutcome::Success => UpdateOutcome::Success,
                    ApplyOutcome::MissingTags => UpdateOutcome::MissingTags,
                    ApplyOutcome::TypeMismatch => UpdateOutcome::TypeMismatch,
                    ApplyOutcome::ApplyFail => UpdateOutcome::ApplyFail,
                }
            }
        }
    }

    async fn write_result(&self, outcome: UpdateOutcome) {
        let value = TagValueData::I32(outcome.raw());
        if let Err(err) = self.tags.write_value(RESULT_TAG_NAME, &value).await {
            error!(
                target: "twc.tagupdate",
                tag = RESULT_TAG_NAME,
                value = outcome.raw(),
                error = %err,
                "unable to set the tag update result tag"
            );
        }
    }
}

/// 把触发标签与信息标签复位到无触发状态。
async fn reset_trigger_signals(tags: &dyn TagStore) {
    if let Err(err) = tags
        .write_value(TRIGGER_TAG_NAME, &TagValueData::I32(TRIGGER_VALUE_NONE))
        .await
    {
        error!(
            target: "twc.tagupdate",
            tag = TRIGGER_TAG_NAME,
            error = %err,
            "unable to reset the tag update trigger tag"
        );
    }
    if let Err(err) = tags
        .write_value(TRIGGER_INFO_TAG_NAME, &TagValueData::Str(String::new()))
        .await
    {
        error!(
            target: "twc.tagupdate",
            tag = TRIGGER_INFO_TAG_NAME,
            error = %err,
            "unable to reset the tag update trigger info tag"
        );
    }
}

/// 启动触发监视任务。
///
/// 轮询触发标签，检测其离开 `TRIGGER_VALUE_NONE` 的边沿：同一时刻捕获
/// 信息串，结果标签复位为 Initial，触发信号立即清除（边沿触发而非
/// 电平触发），然后把事件送入通道。
pub fn spawn_trigger_watcher(
    tags: Arc<dyn TagStore>,
    events: mpsc::Sender<TriggerEvent>,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "twc.tagupdate", "trigger_watcher_started");
        loop {
            ticker.tick().await;
            if *stop.borrow() {
                break;
            }
            let trigger_value = match tags.read_value(TRIGGER_TAG_NAME).await {
                Ok(TagValueData::I32(value)) => value,
                Ok(_) | Err(_) => continue,
            };
            if trigger_value == TRIGGER_VALUE_NONE {
                continue;
            }
            let info = match tags.read_value(TRIGGER_INFO_TAG_NAME).await {
                Ok(TagValueData::Str(info)) => info,
                Ok(_) => String::new(),
                Err(err) => {
                    warn!(
                        target: "twc.tagupdate",
                        tag = TRIGGER_INFO_TAG_NAME,
                        error = %err,
                        "unable to get the trigger info value to send with the tag update request"
                    );
                    String::new()
                }
            };
            if let Err(err) = tags
                .write_value(
                    RESULT_TAG_NAME,
                    &TagValueData::I32(UpdateOutcome::Initial.raw()),
                )
                .await
            {
                error!(
                    target: "twc.tagupdate",
                    tag = RESULT_TAG_NAME,
                    error = %err,
                    "unable to reset the tag update result tag"
                );
            }
            reset_trigger_signals(tags.as_ref()).await;
            if events
                .send(TriggerEvent {
                    trigger_value,
                    info,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        info!(target: "twc.tagupdate", "trigger_watcher_stopped");
    })
}

/// 启动触发事件监听任务：串行处理事件，通道关闭后退出。
pub fn spawn_trigger_listener(
    service: Arc<TagUpdateService>,
    mut events: mpsc::Receiver<TriggerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let _ = service.process_trigger(event).await;
        }
        info!(target: "twc.tagupdate", "trigger_listener_stopped");
    })
}
