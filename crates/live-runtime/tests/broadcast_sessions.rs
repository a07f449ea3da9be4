//! Broadcasts between live session actors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use live_runtime::actors::SessionActor;
use live_runtime::errors::DropReason;
use live_runtime::hub::Delivery;
use live_runtime::{Params, SessionActorHandle, SessionId, SessionRuntime};
use live_test_utils::*;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn spawn(runtime: &SessionRuntime<Counter>) -> (SessionActorHandle<Counter>, JoinHandle<()>) {
    let (sink, _frames) = frame_channel();
    // Frames are not inspected here; a closed sink only discards them
    SessionActor::spawn(
        SessionId::new(),
        Params::new(),
        sink,
        CancellationToken::new(),
        runtime.clone(),
    )
}

/// Wait until everything queued for `handle` so far has been processed.
async fn settle(handle: &SessionActorHandle<Counter>) -> Counter {
    handle.get_state().await.unwrap();
    handle.get_or_init_snapshot().await.unwrap().snapshot
}

#[tokio::test]
async fn test_publish_reaches_every_session_once() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());

    let sessions: Vec<_> = (0..5).map(|_| spawn(&runtime)).collect();
    for (handle, _) in &sessions {
        handle.get_or_init_snapshot().await.unwrap();
    }

    let report = runtime.hub().publish("tick", json!(null)).await;
    assert_eq!(report.delivered, 5);
    assert_eq!(report.dropped, 0);

    for (handle, _) in &sessions {
        let counter = settle(handle).await;
        assert_eq!(counter.value, 1);
        assert_eq!(counter.log, vec!["tick"]);
    }

    for (handle, _) in &sessions {
        handle.cancel();
    }
}

#[tokio::test]
async fn test_broadcast_from_handler_rerenders_every_session() {
    let mounts = MountCounter::new();
    let renderer = RecordingRenderer::new();
    let runtime = test_runtime(counter_registry(&mounts), renderer.clone());

    let (alice, _) = spawn(&runtime);
    let (bob, _) = spawn(&runtime);
    alice.get_or_init_snapshot().await.unwrap();
    bob.get_or_init_snapshot().await.unwrap();

    alice
        .client_event("shout", Params::new().with("message", "Alice: hello"))
        .await
        .unwrap();

    // Alice's shout is fully handled (and published) once she answers
    settle(&alice).await;
    let alice_state = settle(&alice).await;
    let bob_state = settle(&bob).await;

    // The originator receives its own broadcast
    assert_eq!(alice_state.status, "Alice: hello");
    assert_eq!(alice_state.log, vec!["shout", "status"]);
    assert_eq!(bob_state.status, "Alice: hello");
    assert_eq!(bob_state.log, vec!["status"]);

    // Two mounts, Alice's shout, then one status render per session
    assert_eq!(renderer.count(), 5);

    alice.cancel();
    bob.cancel();
}

#[tokio::test]
async fn test_send_self_only_reaches_originator() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());

    let (alice, _) = spawn(&runtime);
    let (bob, _) = spawn(&runtime);
    bob.get_or_init_snapshot().await.unwrap();

    alice
        .client_event("whisper", Params::new().with("message", "psst"))
        .await
        .unwrap();
    settle(&alice).await;
    let alice_state = settle(&alice).await;
    let bob_state = settle(&bob).await;

    assert_eq!(alice_state.status, "psst");
    assert_eq!(bob_state.status, "");
    assert!(bob_state.log.is_empty());

    alice.cancel();
    bob.cancel();
}

#[tokio::test]
async fn test_failed_handler_publishes_nothing() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());

    let (alice, _) = spawn(&runtime);
    let (bob, _) = spawn(&runtime);
    bob.get_or_init_snapshot().await.unwrap();

    // `add` with a bad param fails before anything is queued; `shout` succeeds
    alice
        .client_event("add", Params::new().with("by", "lots"))
        .await
        .unwrap();
    alice
        .client_event("shout", Params::new().with("message", "only once"))
        .await
        .unwrap();
    settle(&alice).await;
    settle(&alice).await;

    let bob_state = settle(&bob).await;
    assert_eq!(bob_state.log, vec!["status"]);

    alice.cancel();
    bob.cancel();
}

#[tokio::test]
async fn test_publish_to_stopped_session_is_silent() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());

    let (handle, task) = spawn(&runtime);
    let session_id = handle.session_id();
    handle.get_or_init_snapshot().await.unwrap();

    assert_eq!(
        runtime.hub().publish_to(session_id, "tick", json!(null)).await,
        Delivery::Delivered
    );

    handle.cancel();
    task.await.unwrap();

    assert!(!runtime.hub().is_subscribed(&session_id));
    assert_eq!(
        runtime.hub().publish_to(session_id, "tick", json!(null)).await,
        Delivery::Dropped(DropReason::SessionGone)
    );

    let report = runtime.hub().publish("tick", json!(null)).await;
    assert_eq!(report.delivered, 0);
}

#[tokio::test]
async fn test_stopped_session_is_skipped_by_broadcast() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());

    let (gone, gone_task) = spawn(&runtime);
    let (live, _) = spawn(&runtime);
    gone.get_or_init_snapshot().await.unwrap();
    live.get_or_init_snapshot().await.unwrap();

    gone.cancel();
    gone_task.await.unwrap();

    let report = runtime.hub().publish("tick", json!(null)).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(settle(&live).await.value, 1);

    live.cancel();
}
