use domain::{DataPoint, TagDataType, TagValueData};
use twc_device::{
    HistorianQueue, InMemoryHistorianQueue, InMemoryTagStore, TagInfo, TagStore,
};

#[tokio::test]
async fn tag_store_round_trip() {
    let store = InMemoryTagStore::new();
    store
        .ensure_tag(
            TagInfo::new("SetPoint", TagDataType::Float),
            TagValueData::F64(10.0),
        )
        .await
        .expect("ensure");

    let info = store
        .find_tag("SetPoint")
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(info.data_type, TagDataType::Float);

    store
        .write_value("SetPoint", &TagValueData::F64(72.5))
        .await
        .expect("write");
    assert_eq!(
        store.read_value("SetPoint").await.expect("read"),
        TagValueData::F64(72.5)
    );
}

#[tokio::test]
async fn tag_store_rejects_type_mismatch_and_unknown_tags() {
    let store = InMemoryTagStore::new();
    store
        .ensure_tag(
            TagInfo::new("Mode", TagDataType::Integer),
            TagValueData::I32(0),
        )
        .await
        .expect("ensure");

    assert!(store
        .write_value("Mode", &TagValueData::Str("auto".to_string()))
        .await
        .is_err());
    assert!(store.write_value("Missing", &TagValueData::I32(1)).await.is_err());
    assert!(store.read_value("Missing").await.is_err());
    assert!(store.find_tag("Missing").await.expect("find").is_none());
}

#[tokio::test]
async fn ensure_tag_keeps_existing_value() {
    let store = InMemoryTagStore::new();
    store
        .ensure_tag(
            TagInfo::new("Counter", TagDataType::Dword),
            TagValueData::Dword(5),
        )
        .await
        .expect("ensure");
    store
        .ensure_tag(
            TagInfo::new("Counter", TagDataType::Dword),
            TagValueData::Dword(0),
        )
        .await
        .expect("ensure again");
    assert_eq!(
        store.read_value("Counter").await.expect("read"),
        TagValueData::Dword(5)
    );
}

#[tokio::test]
async fn historian_span_read_and_tracker() {
    let historian = InMemoryHistorianQueue::new(3, 0);
    assert!(!historian.time_tracker_exists().await.expect("exists"));

    // 新建 tracker：之前无数据可读。
    let first = historian.read_next_span(true).await.expect("read");
    assert!(first.is_empty());
    assert!(historian.time_tracker_exists().await.expect("exists"));

    historian
        .push_data_point(DataPoint::new(
            "PumpSpeed",
            TagValueData::F64(42.0),
            1,
            1_700_000_000,
        ))
        .expect("push");
    historian
        .push_data_point(DataPoint::new(
            "PumpSpeed",
            TagValueData::F64(43.0),
            1,
            1_700_000_060,
        ))
        .expect("push");

    let drained = historian.read_next_span(false).await.expect("read");
    assert_eq!(drained.len(), 2);
    assert_eq!(historian.queued_len(), 0);

    // 排空后滞后为正（tracker 停在最后一条历史数据点上）。
    assert!(historian.lag_millis().await.expect("lag") >= 0);
}

#[tokio::test]
async fn historian_force_reset_skips_queued_history() {
    let historian = InMemoryHistorianQueue::new(3, 0);
    let _ = historian.read_next_span(true).await.expect("read");
    historian
        .push_data_point(DataPoint::new(
            "Level",
            TagValueData::I32(7),
            1,
            1_700_000_000,
        ))
        .expect("push");

    let reread = historian.read_next_span(true).await.expect("read");
    assert!(reread.is_empty());
    assert_eq!(historian.queued_len(), 0);
}

#[tokio::test]
async fn historian_span_setting_round_trips() {
    let historian = InMemoryHistorianQueue::new(3, 0);
    assert_eq!(historian.span_minutes().await.expect("span"), 3);
    historian.set_span_minutes(6).await.expect("set");
    assert_eq!(historian.span_minutes().await.expect("span"), 6);
    historian.advance_tracker().await.expect("advance");
}
