//! Connection lifecycle against a durable registry

use std::sync::Arc;

use pinstream::links::PassthroughLinks;
use pinstream::{ChangeDispatcher, ChangeRecord, ConnectionLifecycle, ConnectionRegistry, DeliveryError};

use crate::common::{ids, RecordingChannel, TestRegistry};

#[test]
fn test_registration_survives_reopen() {
    let store = TestRegistry::new();
    let lifecycle = ConnectionLifecycle::new(Arc::new(store.open()));

    lifecycle.on_connect("c1").unwrap();
    lifecycle.on_connect("c2").unwrap();
    lifecycle.on_disconnect("c1");

    assert_eq!(store.open().list_all().unwrap(), ids(&["c2"]));
}

#[test]
fn test_disconnect_of_unknown_id_is_harmless() {
    let store = TestRegistry::new();
    let lifecycle = ConnectionLifecycle::new(Arc::new(store.seeded(&["c1"])));
    lifecycle.on_disconnect("never-seen");
    assert_eq!(store.open().list_all().unwrap(), ids(&["c1"]));
}

#[tokio::test]
async fn test_abrupt_disconnect_cleaned_up_by_next_dispatch() {
    let store = TestRegistry::new();
    let registry = Arc::new(store.open());
    let lifecycle = ConnectionLifecycle::new(registry.clone());

    // "dropped" never runs on_disconnect; its transport reports it gone
    lifecycle.on_connect("alive").unwrap();
    lifecycle.on_connect("dropped").unwrap();

    let channel = Arc::new(RecordingChannel::new().fail("dropped", DeliveryError::Gone));
    let dispatcher = ChangeDispatcher::new(registry.clone(), channel, Arc::new(PassthroughLinks));
    dispatcher.handle_batch(&[ChangeRecord::remove("1,1")]).await.unwrap();

    assert_eq!(registry.list_all().unwrap(), ids(&["alive"]));
}
