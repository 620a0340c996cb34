//! Change-log intake feeding the dispatcher

use std::sync::Arc;
use std::time::Duration;

use pinstream::changelog::{run_change_feed, RedeliveryPolicy};
use pinstream::links::PassthroughLinks;
use pinstream::{ChangeDispatcher, ChangeRecord, PinChange};

use crate::common::{saved_pin, RecordingChannel, TestRegistry};

fn jsonl(batches: &[Vec<ChangeRecord>]) -> String {
    batches
        .iter()
        .map(|batch| serde_json::to_string(batch).unwrap() + "\n")
        .collect()
}

#[tokio::test]
async fn test_batches_delivered_in_arrival_order() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["c1"]));
    let channel = Arc::new(RecordingChannel::new());
    let dispatcher = ChangeDispatcher::new(registry, channel.clone(), Arc::new(PassthroughLinks));

    let input = jsonl(&[
        vec![ChangeRecord::insert(saved_pin("1,1", "first"))],
        vec![ChangeRecord::modify(saved_pin("1,1", "second"))],
        vec![ChangeRecord::remove("1,1")],
    ]);
    let policy = RedeliveryPolicy {
        max_redeliveries: 0,
        delay: Duration::from_millis(1),
    };
    let stats = run_change_feed(input.as_bytes(), &dispatcher, policy).await.unwrap();

    assert_eq!(stats.dispatched, 3);
    let events: Vec<String> = channel
        .payloads_for("c1")
        .iter()
        .map(|payload| {
            let entries: Vec<PinChange> = serde_json::from_str(payload).unwrap();
            entries[0].event_name.to_string()
        })
        .collect();
    assert_eq!(events, vec!["INSERT", "MODIFY", "REMOVE"]);
}

#[tokio::test]
async fn test_old_image_never_reaches_clients() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["c1"]));
    let channel = Arc::new(RecordingChannel::new());
    let dispatcher = ChangeDispatcher::new(registry, channel.clone(), Arc::new(PassthroughLinks));

    let line = r#"[{"key":{"pointUrl":"1,1"},"eventName":"MODIFY","newImage":{"pointUrl":"1,1","point":{"lat":1,"lng":1},"customName":"new"},"oldImage":{"pointUrl":"1,1","point":{"lat":1,"lng":1},"customName":"old"}}]"#;
    run_change_feed(line.as_bytes(), &dispatcher, RedeliveryPolicy::default())
        .await
        .unwrap();

    let payload = &channel.payloads_for("c1")[0];
    assert!(payload.contains("\"new\""));
    assert!(!payload.contains("oldImage"));
}
