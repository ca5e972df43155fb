use pmac_telemetry::{
    metrics, new_session_id, record_reply_mismatch, record_transaction,
    record_transaction_failure,
};

#[test]
fn session_ids_are_unique() {
    let first = new_session_id();
    let second = new_session_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_transaction(12, 30, 4);
    record_transaction_failure();
    record_reply_mismatch();
    let after = metrics().snapshot();

    assert!(after.transactions >= before.transactions + 2);
    assert!(after.transaction_failures > before.transaction_failures);
    assert!(after.bytes_written >= before.bytes_written + 12);
    assert!(after.bytes_read >= before.bytes_read + 30);
    assert!(after.reply_mismatches > before.reply_mismatches);
    assert!(after.latency_ms_count > before.latency_ms_count);
}
