//! ClientSession over an in-memory pin API

use std::sync::Arc;
use std::time::Duration;

use pinstream::client::{ApiError, Backoff, ClientSession};
use pinstream::{
    ChangeRecord, ConnectionRegistry, MergeOutcome, PinChange, PinPoint, PinstreamError, Selection,
};

use crate::common::{eventually, saved_pin, Daemon, MemoryPinApi, WAIT};

#[tokio::test]
async fn test_local_save_then_echoed_insert() {
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));
    let session = ClientSession::new(api.clone());
    session.hydrate().await.unwrap();

    session.reconciler().lock().select_point(PinPoint::new(2.0, 2.0));
    let saved = session.save("mine", None).await.unwrap();

    // The same change comes back through the push channel
    let echo = PinChange::from(ChangeRecord::insert(saved.clone()));
    let outcome = session.reconciler().lock().apply(echo);

    assert_eq!(outcome, MergeOutcome::Replaced);
    let reconciler = session.reconciler().lock();
    assert_eq!(reconciler.len(), 2);
    assert_eq!(reconciler.selection(), &Selection::Saved(saved));
}

#[tokio::test]
async fn test_save_conflict_leaves_cache_alone() {
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));
    let session = ClientSession::new(api);
    // Not hydrated: the stored pin is not in the cache yet
    session.reconciler().lock().select_point(PinPoint::new(1.0, 1.0));

    let result = session.save("dup", None).await;

    assert!(matches!(
        result,
        Err(PinstreamError::Api(ApiError::AlreadyExists { .. }))
    ));
    assert!(session.reconciler().lock().is_empty());
}

#[tokio::test]
async fn test_delete_of_pin_removed_elsewhere() {
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));
    let session = ClientSession::new(api.clone());
    session.hydrate().await.unwrap();
    session.reconciler().lock().select_key("1,1");

    // Another client deleted it; our push has not arrived yet
    api.delete_pin_directly("1,1");

    session.delete().await.unwrap();
    assert!(session.reconciler().lock().is_empty());
    assert!(!session.reconciler().lock().selection().is_saved());
}

#[tokio::test]
async fn test_rename_updates_cache_and_selection() {
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));
    let session = ClientSession::new(api);
    session.hydrate().await.unwrap();
    session.reconciler().lock().select_key("1,1");

    session.rename("renamed").await.unwrap();

    let reconciler = session.reconciler().lock();
    assert_eq!(reconciler.get("1,1").unwrap().custom_name, "renamed");
    match reconciler.selection() {
        Selection::Saved(pin) => assert_eq!(pin.custom_name, "renamed"),
        other => panic!("expected saved selection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_started_session_receives_changes_committed_right_after_start() {
    let daemon = Daemon::start().await;
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));

    let session = ClientSession::start(api, &daemon.url(), Backoff::default(), WAIT)
        .await
        .unwrap();

    // Live implies the push socket is already registered
    assert!(session.reconciler().lock().is_authoritative());
    assert_eq!(daemon.registry.list_all().unwrap().len(), 1);

    let report = daemon
        .dispatcher
        .handle_batch(&[ChangeRecord::insert(saved_pin("2,2", "b"))])
        .await
        .unwrap();
    assert_eq!(report.delivered.len(), 1);

    let reconciler = session.reconciler().clone();
    assert!(eventually(WAIT, || reconciler.lock().get("2,2").is_some()).await);
    assert_eq!(reconciler.lock().len(), 2);
}

#[tokio::test]
async fn test_start_fails_when_daemon_never_registers() {
    // Reserve a port, then free it so nothing is listening
    let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let api = Arc::new(MemoryPinApi::with_pins(vec![saved_pin("1,1", "a")]));
    let backoff = Backoff {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(50),
    };

    let result = ClientSession::start(
        api,
        &format!("ws://{}", addr),
        backoff,
        Duration::from_millis(300),
    )
    .await;

    assert!(matches!(result, Err(PinstreamError::Channel { .. })));
}
