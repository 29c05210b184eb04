//! 应用运行配置加载。
//!
//! 所有配置项都有文档化默认值：缺失或非法的取值记录警告并回退，
//! 配置读取永远不会使进程中止。

use std::env;
use tracing::warn;

/// 云端遥测端点默认值。该地址位于 test-net IPv4 段，正常网络不可达，
/// 用于提示用户必须完成配置。
pub const DEFAULT_CLOUD_ENDPOINT_URL: &str = "https://203.0.113.1/Thingworx";

/// 应用密钥默认占位值。
pub const DEFAULT_APP_KEY: &str = "Set-This-Value";

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 遥测载荷端点完整 URL。
    pub cloud_endpoint_url: String,
    /// 标签更新端点完整 URL（未配置则禁用远程标签更新）。
    pub tag_update_url: Option<String>,
    /// 云端应用密钥（单一静态凭据）。
    pub app_key: String,
    /// 单个载荷的最大数据点数。
    pub payload_max_data_points: usize,
    /// 投递任务的发送周期（毫秒）。
    pub payload_send_interval_millis: u64,
    /// 历史队列轮询周期（毫秒）。
    pub queue_poll_interval_millis: u64,
    /// 每次轮询读取的时间跨度（分钟）。
    pub queue_poll_span_minutes: u64,
    /// 队列滞后告警阈值（毫秒）。
    pub queue_behind_warn_millis: i64,
    /// 轮询所需的最低可用内存（字节）。
    pub queue_poll_min_memory_bytes: u64,
    /// 是否启用队列诊断标签。
    pub queue_diagnostic_tags_enabled: bool,
    /// 队列读取失败策略（`retry-then-advance` / `advance-immediately`）。
    pub queue_poll_failure_policy: String,
    /// 读取失败的最大重试次数。
    pub queue_poll_max_retries: u32,
    /// 线性退避斜率（毫秒/次）。
    pub queue_poll_retry_slope_millis: u64,
    /// 出站 HTTP 超时（秒）。
    pub http_timeout_seconds: u64,
    /// 设备序列号（用于云端侧设备命名）。
    pub device_serial: String,
    /// 设备本地时间相对 UTC 的偏移（毫秒）。
    pub utc_offset_millis: i64,
}

impl AppConfig {
    /// 从环境变量读取配置；任何一项失败都回退默认值并告警。
    pub fn from_env() -> Self {
        let cloud_endpoint_url = read_string_with_default(
            "TWC_CLOUD_ENDPOINT_URL",
            DEFAULT_CLOUD_ENDPOINT_URL,
        );
        if cloud_endpoint_url == DEFAULT_CLOUD_ENDPOINT_URL {
            warn!(
                target: "twc.config",
                "the cloud endpoint URL is the default value, telemetry cannot reach a real instance until it is configured"
            );
        }
        let app_key = read_string_with_default("TWC_APP_KEY", DEFAULT_APP_KEY);
        if app_key == DEFAULT_APP_KEY {
            warn!(
                target: "twc.config",
                "the application key has not been configured, remote requests will be rejected"
            );
        }

        Self {
            cloud_endpoint_url,
            tag_update_url: read_optional("TWC_TAG_UPDATE_URL"),
            app_key,
            payload_max_data_points: read_usize_with_default("TWC_PAYLOAD_MAX_DATA_POINTS", 50),
            payload_send_interval_millis: read_u64_with_default(
                "TWC_PAYLOAD_SEND_INTERVAL_MILLIS",
                5_000,
            ),
            queue_poll_interval_millis: read_u64_with_default(
                "TWC_QUEUE_POLL_INTERVAL_MILLIS",
                10_000,
            ),
            queue_poll_span_minutes: read_u64_with_default("TWC_QUEUE_POLL_SPAN_MINS", 3),
            queue_behind_warn_millis: read_i64_with_default(
                "TWC_QUEUE_BEHIND_WARN_MILLIS",
                300_000,
            ),
            queue_poll_min_memory_bytes: read_u64_with_default(
                "TWC_QUEUE_POLL_MIN_MEMORY_BYTES",
                5_000_000,
            ),
            queue_diagnostic_tags_enabled: read_bool_with_default(
                "TWC_QUEUE_DIAGNOSTIC_TAGS",
                false,
            ),
            queue_poll_failure_policy: read_string_with_default(
                "TWC_QUEUE_POLL_FAILURE_POLICY",
                "retry-then-advance",
            ),
            queue_poll_max_retries: read_u32_with_default("TWC_QUEUE_POLL_MAX_RETRIES", 3),
            queue_poll_retry_slope_millis: read_u64_with_default(
                "TWC_QUEUE_POLL_RETRY_SLOPE_MILLIS",
                1_000,
            ),
            http_timeout_seconds: read_u64_with_default("TWC_HTTP_TIMEOUT_SECONDS", 2),
            device_serial: read_string_with_default("TWC_DEVICE_SERIAL", "invalid"),
            utc_offset_millis: read_i64_with_default("TWC_UTC_OFFSET_MILLIS", 0),
        }
    }
}

fn read_string_with_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_u64_with_default(key: &str, default: u64) -> u64 {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    match value.parse::<u64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn_invalid(key, &value, &default.to_string());
            default
        }
    }
}

fn read_u32_with_default(key: &str, default: u32) -> u32 {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    match value.parse::<u32>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn_invalid(key, &value, &default.to_string());
            default
        }
    }
}

fn read_usize_with_default(key: &str, default: usize) -> usize {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    match value.parse::<usize>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn_invalid(key, &value, &default.to_string());
            default
        }
    }
}

fn read_i64_with_default(key: &str, default: i64) -> i64 {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    match value.parse::<i64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn_invalid(key, &value, &default.to_string());
            default
        }
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

fn warn_invalid(key: &str, value: &str, default: &str) {
    warn!(
        target: "twc.config",
        env = key,
        value = value,
        default = default,
        "invalid configuration value, falling back to default"
    );
}
