use twc_telemetry::{
    metrics, new_attempt_id, record_payload_send_success, record_queue_poll,
};

#[test]
fn attempt_id_non_empty() {
    let id = new_attempt_id();
    assert!(!id.is_empty());
    assert_ne!(id, new_attempt_id());
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_queue_poll();
    record_payload_send_success(7);
    let after = metrics().snapshot();
    assert_eq!(after.queue_polls, before.queue_polls + 1);
    assert_eq!(after.payload_send_success, before.payload_send_success + 1);
    assert_eq!(after.datapoints_sent, before.datapoints_sent + 7);
}
