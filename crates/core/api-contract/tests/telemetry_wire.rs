use api_contract::TelemetryEnvelope;
use domain::{DataPoint, DeviceIdentity, TagValueData};
use serde_json::Value;

fn sample_identity() -> DeviceIdentity {
    DeviceIdentity::from_serial("1234-5678-90", -14_400_000)
}

#[test]
fn envelope_matches_expected_shape() {
    let points = vec![
        DataPoint::new("PumpSpeed", TagValueData::F64(42.5), 1, 1_700_000_000),
        DataPoint::new("RunHours", TagValueData::I32(813), 1, 1_700_000_060),
    ];
    let envelope = TelemetryEnvelope::from_data_points(&points, &sample_identity());
    let value = serde_json::to_value(&envelope).expect("serialize");

    let tags = value.get("Tags").expect("Tags object");
    let datapoints = tags
        .get("datapoints")
        .and_then(Value::as_array)
        .expect("datapoints array");
    assert_eq!(datapoints.len(), 2);

    let first = &datapoints[0];
    assert_eq!(first.get("name").and_then(Value::as_str), Some("PumpSpeed"));
    assert_eq!(first.get("value").and_then(Value::as_f64), Some(42.5));
    assert_eq!(first.get("type").and_then(Value::as_i64), Some(1));
    assert_eq!(first.get("quality").and_then(Value::as_i64), Some(1));
    let timestamp = first
        .get("timestamp")
        .and_then(Value::as_str)
        .expect("timestamp string");
    assert!(timestamp.ends_with("-04:00"), "got {timestamp}");

    let info = tags.get("info").expect("info object");
    assert_eq!(
        info.get("ewon-name").and_then(Value::as_str),
        Some("FLEXY-1234-5678-90")
    );
    assert_eq!(
        info.get("ewon-utc-offset-millis").and_then(Value::as_str),
        Some("-14400000")
    );
}

#[test]
fn empty_payload_still_carries_info() {
    let envelope = TelemetryEnvelope::from_data_points(&[], &sample_identity());
    let value = serde_json::to_value(&envelope).expect("serialize");
    let tags = value.get("Tags").expect("Tags object");
    assert_eq!(
        tags.get("datapoints").and_then(Value::as_array).map(Vec::len),
        Some(0)
    );
    assert!(tags.get("info").is_some());
}

#[test]
fn dword_and_bool_values_keep_raw_form() {
    let points = vec![
        DataPoint::new("Counter", TagValueData::Dword(4_000_000_000), 1, 1_700_000_000),
        DataPoint::new("Running", TagValueData::Bool(true), 1, 1_700_000_000),
        DataPoint::new("Label", TagValueData::Str("line-3".to_string()), 1, 1_700_000_000),
    ];
    let envelope = TelemetryEnvelope::from_data_points(&points, &sample_identity());
    let value = serde_json::to_value(&envelope).expect("serialize");
    let datapoints = value["Tags"]["datapoints"].as_array().expect("array");
    assert_eq!(datapoints[0]["value"].as_u64(), Some(4_000_000_000));
    assert_eq!(datapoints[0]["type"].as_i64(), Some(3));
    assert_eq!(datapoints[1]["value"].as_bool(), Some(true));
    assert_eq!(datapoints[2]["value"].as_str(), Some("line-3"));
    assert_eq!(datapoints[2]["type"].as_i64(), Some(6));
}
