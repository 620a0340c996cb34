//! Dispatch through the change dispatcher

use std::sync::Arc;
use std::time::{Duration, Instant};

use pinstream::links::{PassthroughLinks, SignedLinkResolver};
use pinstream::{
    fan_out, ChangeDispatcher, ChangeRecord, ConnectionRegistry, DeliveryError, PinChange,
};

use crate::common::{ids, saved_pin, saved_pin_with_image, RecordingChannel, TestRegistry};

#[tokio::test]
async fn test_gone_connection_pruned_and_stays_pruned() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["c1", "c2", "c3"]));
    let channel = Arc::new(RecordingChannel::new().fail("c2", DeliveryError::Gone));
    let dispatcher = ChangeDispatcher::new(registry.clone(), channel.clone(), Arc::new(PassthroughLinks));

    let report = dispatcher
        .handle_batch(&[ChangeRecord::modify(saved_pin("10,20", "cafe"))])
        .await
        .unwrap();

    assert_eq!(report.delivered, ids(&["c1", "c3"]));
    assert_eq!(report.pruned, ids(&["c2"]));
    assert!(report.failed.is_empty());

    // Durable: a new handle sees the pruned set
    drop(dispatcher);
    drop(registry);
    assert_eq!(store.open().list_all().unwrap(), ids(&["c1", "c3"]));
}

#[tokio::test]
async fn test_every_connection_gets_the_same_envelope() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["a", "b"]));
    let channel = Arc::new(RecordingChannel::new());
    let dispatcher = ChangeDispatcher::new(registry, channel.clone(), Arc::new(PassthroughLinks));

    dispatcher
        .handle_batch(&[
            ChangeRecord::insert(saved_pin("1,1", "one")),
            ChangeRecord::remove("2,2"),
        ])
        .await
        .unwrap();

    let a = channel.payloads_for("a");
    let b = channel.payloads_for("b");
    assert_eq!(a.len(), 1);
    assert_eq!(a, b);

    let entries: Vec<PinChange> = serde_json::from_str(&a[0]).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].point_url(), "1,1");
    assert!(entries[1].new_image.is_none());
}

#[tokio::test]
async fn test_slow_connection_does_not_serialize_fan_out() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["a", "b", "c", "d"]));
    let delay = Duration::from_millis(200);
    let channel = Arc::new(
        RecordingChannel::new()
            .delay("a", delay)
            .delay("b", delay)
            .delay("c", delay)
            .delay("d", delay),
    );
    let dispatcher = ChangeDispatcher::new(registry, channel.clone(), Arc::new(PassthroughLinks));

    let started = Instant::now();
    let report = dispatcher
        .handle_batch(&[ChangeRecord::remove("1,1")])
        .await
        .unwrap();

    assert_eq!(report.delivered.len(), 4);
    assert!(started.elapsed() < delay * 3, "pushes ran one after another");
}

#[tokio::test]
async fn test_mixed_failures_are_isolated() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["ok", "gone", "slow", "big"]));
    let channel = Arc::new(
        RecordingChannel::new()
            .fail("gone", DeliveryError::Gone)
            .fail("slow", DeliveryError::TimedOut(Duration::from_secs(1)))
            .fail("big", DeliveryError::PayloadTooLarge { size: 10, limit: 5 }),
    );
    let dispatcher = ChangeDispatcher::new(registry.clone(), channel, Arc::new(PassthroughLinks));

    let report = dispatcher
        .handle_batch(&[ChangeRecord::remove("1,1")])
        .await
        .unwrap();

    assert_eq!(report.attempted(), 4);
    assert_eq!(report.delivered, ids(&["ok"]));
    assert_eq!(report.pruned, ids(&["gone"]));
    assert_eq!(report.failed.len(), 2);
    // Only the gone connection loses its registration
    assert_eq!(registry.list_all().unwrap(), ids(&["big", "ok", "slow"]));
}

#[tokio::test]
async fn test_image_links_issued_at_dispatch() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.seeded(&["c1"]));
    let channel = Arc::new(RecordingChannel::new());
    let links = Arc::new(SignedLinkResolver::new(
        "https://files.example.com",
        "pin-images",
        b"test-secret",
        Duration::from_secs(300),
    )
    .unwrap());
    let dispatcher = ChangeDispatcher::new(registry, channel.clone(), links.clone());

    dispatcher
        .handle_batch(&[ChangeRecord::insert(saved_pin_with_image("10,20"))])
        .await
        .unwrap();

    let entries: Vec<PinChange> = serde_json::from_str(&channel.payloads_for("c1")[0]).unwrap();
    let pin = entries[0].new_image.as_ref().unwrap();
    let url = pin.image.as_ref().unwrap().url.as_deref().unwrap();
    assert!(links.verify(url, chrono::Utc::now().timestamp()));
    assert_eq!(
        pin.thumbnail.as_ref().unwrap().url.as_deref(),
        Some("https://cdn.example.com/thumb.jpg")
    );
}

#[tokio::test]
async fn test_fan_out_to_explicit_targets() {
    let store = TestRegistry::new();
    let registry = store.seeded(&["a", "b", "c"]);
    let channel = RecordingChannel::new().fail("c", DeliveryError::Gone);

    let report = fan_out(&registry, &channel, &ids(&["b", "c"]), "{}").await;

    assert_eq!(report.delivered, ids(&["b"]));
    assert_eq!(channel.payloads_for("a").len(), 0);
    assert_eq!(registry.list_all().unwrap(), ids(&["a", "b"]));
}
