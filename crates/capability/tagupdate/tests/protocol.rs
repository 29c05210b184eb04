use async_trait::async_trait;
use domain::{TagDataType, TagValueData};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use twc_device::{InMemoryTagStore, TagInfo, TagStore};
use twc_tagupdate::{
    RESULT_TAG_NAME, TRIGGER_INFO_TAG_NAME, TRIGGER_TAG_NAME, TagUpdateConfig, TagUpdateService,
    TriggerEvent, UpdateOutcome, spawn_trigger_listener, spawn_trigger_watcher,
};
use twc_transport::{JsonPoster, PostOutcome};

/// 按脚本应答并记录请求体的传输桩；发送时顺带记录结果标签的当前值。
struct ScriptedPoster {
    outcomes: Mutex<VecDeque<PostOutcome>>,
    bodies: Mutex<Vec<String>>,
    tags: Arc<InMemoryTagStore>,
    result_at_post: Mutex<Vec<i32>>,
}

impl ScriptedPoster {
    fn new(tags: Arc<InMemoryTagStore>, outcomes: Vec<PostOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            bodies: Mutex::new(Vec::new()),
            tags,
            result_at_post: Mutex::new(Vec::new()),
        })
    }

    async fn bodies(&self) -> Vec<String> {
        self.bodies.lock().await.clone()
    }

    async fn result_at_post(&self) -> Vec<i32> {
        self.result_at_post.lock().await.clone()
    }
}

#[async_trait]
impl JsonPoster for ScriptedPoster {
    async fn post_json(&self, _url: &str, body: String) -> PostOutcome {
        self.bodies.lock().await.push(body);
        if let Ok(TagValueData::I32(value)) = self.tags.read_value(RESULT_TAG_NAME).await {
            self.result_at_post.lock().await.push(value);
        }
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(PostOutcome::ConnectionError("no script".to_string()))
    }
}

async fn seeded_tags() -> Arc<InMemoryTagStore> {
    let tags = Arc::new(InMemoryTagStore::new());
    tags.ensure_tag(
        TagInfo::new("SetPoint", TagDataType::Float),
        TagValueData::F64(10.0),
    )
    .await
    .expect("ensure");
    tags.ensure_tag(
        TagInfo::new("Mode", TagDataType::Integer),
        TagValueData::I32(1),
    )
    .await
    .expect("ensure");
    tags
}

async fn service_with(
    tags: Arc<InMemoryTagStore>,
    outcomes: Vec<PostOutcome>,
) -> (Arc<TagUpdateService>, Arc<ScriptedPoster>) {
    let poster = ScriptedPoster::new(tags.clone(), outcomes);
    let service = Arc::new(TagUpdateService::new(
        tags,
        poster.clone(),
        TagUpdateConfig {
            endpoint_url: "https://cloud.example/Thingworx/TagUpdate".to_string(),
        },
    ));
    service.ensure_protocol_tags().await;
    (service, poster)
}

fn success_body(id: &str) -> PostOutcome {
    PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tags": [
                    {"name": "SetPoint", "type": "float", "value": 72.5},
                    {"name": "Mode", "type": "integer", "value": 3}
                ]
            }
        })
        .to_string(),
    )
}

async fn result_tag_value(tags: &InMemoryTagStore) -> i32 {
    match tags.read_value(RESULT_TAG_NAME).await.expect("read") {
        TagValueData::I32(value) => value,
        other => panic!("unexpected result tag value: {other:?}"),
    }
}

fn trigger(value: i32) -> TriggerEvent {
    TriggerEvent {
        trigger_value: value,
        info: "recipe change".to_string(),
    }
}

#[tokio::test]
async fn full_cycle_applies_tags_and_reports_success() {
    let tags = seeded_tags().await;
    let (service, poster) = service_with(tags.clone(), vec![success_body("0")]).await;

    let outcome = service.process_trigger(trigger(3)).await;

    assert_eq!(outcome, UpdateOutcome::Success);
    assert_eq!(result_tag_value(&tags).await, 2);
    assert_eq!(
        tags.read_value("SetPoint").await.expect("read"),
        TagValueData::F64(72.5)
    );
    assert_eq!(
        tags.read_value("Mode").await.expect("read"),
        TagValueData::I32(3)
    );

    let bodies = poster.bodies().await;
    assert_eq!(bodies.len(), 1);
    let request: serde_json::Value = serde_json::from_str(&bodies[0]).expect("json");
    assert_eq!(request["jsonrpc"].as_str(), Some("2.0"));
    assert_eq!(request["method"].as_str(), Some("3"));
    assert_eq!(request["id"].as_str(), Some("0"));
    assert_eq!(
        request["params"]["stringInfo"].as_str(),
        Some("recipe change")
    );
}

#[tokio::test]
async fn result_tag_passes_through_http_started() {
    let tags = seeded_tags().await;
    let (service, poster) = service_with(tags.clone(), vec![success_body("0")]).await;

    let _ = service.process_trigger(trigger(1)).await;

    // 发送时结果标签已是 http-started（raw 1），完成后为 success。
    assert_eq!(poster.result_at_post().await, vec![1]);
    assert_eq!(result_tag_value(&tags).await, 2);
}

#[tokio::test]
async fn mismatched_response_id_verifies_fail_and_writes_nothing() {
    let tags = seeded_tags().await;
    let (service, _poster) = service_with(tags.clone(), vec![success_body("999")]).await;

    let outcome = service.process_trigger(trigger(1)).await;

    assert_eq!(outcome, UpdateOutcome::VerifyFail);
    assert_eq!(result_tag_value(&tags).await, 5);
    assert_eq!(
        tags.read_value("SetPoint").await.expect("read"),
        TagValueData::F64(10.0)
    );
}

#[tokio::test]
async fn mismatched_protocol_version_verifies_fail() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "1.0",
            "id": "0",
            "result": {"tags": []}
        })
        .to_string(),
    );
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;
    assert_eq!(outcome, UpdateOutcome::VerifyFail);
}

#[tokio::test]
async fn remote_error_code_surfaces_verbatim() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "error": {"code": 17, "message": "no update available"}
        })
        .to_string(),
    );
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;

    assert_eq!(outcome, UpdateOutcome::RemoteError(17));
    assert_eq!(result_tag_value(&tags).await, 17);
    assert_eq!(
        tags.read_value("SetPoint").await.expect("read"),
        TagValueData::F64(10.0)
    );
}

#[tokio::test]
async fn remote_error_without_code_verifies_fail() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "error": {"message": "unspecified"}
        })
        .to_string(),
    );
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;
    assert_eq!(outcome, UpdateOutcome::VerifyFail);
}

#[tokio::test]
async fn transport_failures_map_to_closed_outcomes() {
    let tags = seeded_tags().await;
    let (service, _poster) = service_with(
        tags.clone(),
        vec![
            PostOutcome::ConnectionError("refused".to_string()),
            PostOutcome::AuthError,
            PostOutcome::DeviceError("request build".to_string()),
            PostOutcome::UnknownStatus(502),
        ],
    )
    .await;

    assert_eq!(
        service.process_trigger(trigger(1)).await,
        UpdateOutcome::ConnectionError
    );
    assert_eq!(
        service.process_trigger(trigger(1)).await,
        UpdateOutcome::ConnectionError
    );
    assert_eq!(
        service.process_trigger(trigger(1)).await,
        UpdateOutcome::DeviceError
    );
    assert_eq!(
        service.process_trigger(trigger(1)).await,
        UpdateOutcome::VerifyFail
    );
}

#[tokio::test]
async fn unparseable_response_body_verifies_fail() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success("<html>bad gateway</html>".to_string());
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;
    assert_eq!(outcome, UpdateOutcome::VerifyFail);
    assert_eq!(result_tag_value(&tags).await, 5);
}

#[tokio::test]
async fn missing_tags_in_result_report_distinct_outcome() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "result": {
                "tags": [
                    {"name": "SetPoint", "type": "float", "value": 72.5},
                    {"name": "DoesNotExist", "type": "integer", "value": 1},
                    {"name": "Mode", "type": "integer", "value": 3}
                ]
            }
        })
        .to_string(),
    );
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;

    assert_eq!(outcome, UpdateOutcome::MissingTags);
    assert_eq!(result_tag_value(&tags).await, 7);
    assert_eq!(
        tags.read_value("SetPoint").await.expect("read"),
        TagValueData::F64(10.0)
    );
}

#[tokio::test]
async fn mismatched_live_type_reports_distinct_outcome() {
    let tags = seeded_tags().await;
    let body = PostOutcome::Success(
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "result": {
                "tags": [
                    {"name": "Mode", "type": "float", "value": 3.0}
                ]
            }
        })
        .to_string(),
    );
    let (service, _poster) = service_with(tags.clone(), vec![body]).await;

    let outcome = service.process_trigger(trigger(1)).await;

    assert_eq!(outcome, UpdateOutcome::TypeMismatch);
    assert_eq!(result_tag_value(&tags).await, 8);
}

#[tokio::test]
async fn request_ids_increase_across_triggers() {
    let tags = seeded_tags().await;
    let (service, poster) =
        service_with(tags.clone(), vec![success_body("0"), success_body("1")]).await;

    let _ = service.process_trigger(trigger(1)).await;
    let _ = service.process_trigger(trigger(2)).await;

    let bodies = poster.bodies().await;
    let first: serde_json::Value = serde_json::from_str(&bodies[0]).expect("json");
    let second: serde_json::Value = serde_json::from_str(&bodies[1]).expect("json");
    assert_eq!(first["id"].as_str(), Some("0"));
    assert_eq!(second["id"].as_str(), Some("1"));
}

#[tokio::test]
async fn trigger_watcher_drives_a_full_cycle() {
    let tags = seeded_tags().await;
    let (service, poster) = service_with(tags.clone(), vec![success_body("0")]).await;

    let (event_tx, event_rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = watch::channel(false);
    let watcher = spawn_trigger_watcher(
        tags.clone(),
        event_tx,
        Duration::from_millis(5),
        stop_rx,
    );
    let listener = spawn_trigger_listener(service, event_rx);

    // 操作员写入信息串后置位触发标签。
    tags.write_value(
        TRIGGER_INFO_TAG_NAME,
        &TagValueData::Str("batch-7".to_string()),
    )
    .await
    .expect("write info");
    tags.write_value(TRIGGER_TAG_NAME, &TagValueData::I32(3))
        .await
        .expect("write trigger");

    // 等待整个周期完成（结果标签离开 initial / http-started）。
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let value = result_tag_value(&tags).await;
        if value == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tag update did not complete, result tag = {value}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // 触发信号已边沿清除。
    assert_eq!(
        tags.read_value(TRIGGER_TAG_NAME).await.expect("read"),
        TagValueData::I32(0)
    );
    assert_eq!(
        tags.read_value(TRIGGER_INFO_TAG_NAME).await.expect("read"),
        TagValueData::Str(String::new())
    );

    // 捕获的信息串随请求发出。
    let bodies = poster.bodies().await;
    let request: serde_json::Value = serde_json::from_str(&bodies[0]).expect("json");
    assert_eq!(request["params"]["stringInfo"].as_str(), Some("batch-7"));

    stop_tx.send(true).expect("stop");
    tokio::time::timeout(Duration::from_secs(1), watcher)
        .await
        .expect("watcher exits")
        .expect("watcher completes");
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener exits")
        .expect("listener completes");
}
