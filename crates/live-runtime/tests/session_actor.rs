//! Session actor behavior: ordering, lazy init and failure isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use live_runtime::actors::{SessionActor, SnapshotOrigin};
use live_runtime::{Event, Params, SessionId};
use live_test_utils::*;
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_renders_follow_submission_order() {
    let mounts = MountCounter::new();
    let renderer = RecordingRenderer::new();
    let runtime = test_runtime(counter_registry(&mounts), renderer.clone());
    let (sink, _frames) = frame_channel();

    let (handle, _task) = SessionActor::spawn(
        SessionId::new(),
        Params::new(),
        sink,
        CancellationToken::new(),
        runtime,
    );

    let events = [
        Event::client("inc", Params::new()),
        Event::client("add", Params::new().with("by", 5)),
        Event::client("dec", Params::new()),
        Event::client("fail", Params::new()),
        Event::client("add", Params::new().with("by", "-2")),
        Event::self_message("tick", json!(null)),
        Event::client("add", Params::new().with("by", "many")),
        Event::client("inc", Params::new()),
    ];
    for event in events {
        handle.submit(event).await.unwrap();
    }

    let outcome = handle.get_or_init_snapshot().await.unwrap();
    assert_eq!(outcome.origin, SnapshotOrigin::Current);

    // Mount, then one render per accepted event; failures render nothing
    let values: Vec<i64> = renderer.snapshots().iter().map(|c| c.value).collect();
    assert_eq!(values, vec![0, 1, 6, 5, 3, 4, 5]);
    assert_eq!(renderer.revisions(), vec![1, 2, 3, 4, 5, 6, 7]);

    assert_eq!(outcome.snapshot.value, 5);
    assert_eq!(
        outcome.snapshot.log,
        vec!["inc", "add", "dec", "add", "tick", "inc"]
    );
    assert_eq!(mounts.count(), 1);

    handle.cancel();
}

#[tokio::test]
async fn test_concurrent_get_or_init_mounts_once() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());
    let (sink, _frames) = frame_channel();

    let (handle, _task) = SessionActor::spawn(
        SessionId::new(),
        Params::new().with("start", 19),
        sink,
        CancellationToken::new(),
        runtime,
    );

    let mut callers = JoinSet::new();
    for _ in 0..32 {
        let handle = handle.clone();
        callers.spawn(async move { handle.get_or_init_snapshot().await.unwrap() });
    }

    let mut fresh = 0;
    while let Some(outcome) = callers.join_next().await {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.snapshot.value, 19);
        assert!(outcome.snapshot.log.is_empty());
        if outcome.origin == SnapshotOrigin::Fresh {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(mounts.count(), 1);

    handle.cancel();
}

#[tokio::test]
async fn test_unknown_event_does_not_stop_session() {
    let mounts = MountCounter::new();
    let runtime = test_runtime(counter_registry(&mounts), RecordingRenderer::new());
    let (sink, mut frames) = frame_channel();

    let (handle, _task) = SessionActor::spawn(
        SessionId::new(),
        Params::new(),
        sink,
        CancellationToken::new(),
        runtime,
    );

    handle.client_event("temp-sideways", Params::new()).await.unwrap();
    handle
        .submit(Event::self_message("no-such-topic", json!(1)))
        .await
        .unwrap();
    handle.client_event("inc", Params::new()).await.unwrap();

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.events_processed, 3);
    assert_eq!(state.revision, 2);
    assert!(!handle.is_closed());

    // Mount frame, then the inc frame
    let mount = next_frame(&mut frames, Duration::from_secs(1)).await;
    let inc = next_frame(&mut frames, Duration::from_secs(1)).await;
    assert_eq!(mount.revision, 1);
    assert_eq!(inc.revision, 2);
    assert!(inc.body.contains("\"value\":1"));

    handle.cancel();
}

#[tokio::test]
async fn test_render_failure_keeps_last_good_frame() {
    let mounts = MountCounter::new();
    let renderer = RecordingRenderer::new().failing_when(|c: &Counter| c.value >= 3);
    let runtime = test_runtime(counter_registry(&mounts), renderer.clone());
    let (sink, mut frames) = frame_channel();

    let (handle, _task) = SessionActor::spawn(
        SessionId::new(),
        Params::new(),
        sink,
        CancellationToken::new(),
        runtime,
    );

    for _ in 0..3 {
        handle.client_event("inc", Params::new()).await.unwrap();
    }
    handle.client_event("dec", Params::new()).await.unwrap();

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.revision, 5);
    assert_eq!(state.rendered_revision, Some(5));

    // Value 3 failed to render; the session moved on regardless
    let revisions: Vec<u64> = drain_frames(&mut frames).iter().map(|f| f.revision).collect();
    assert_eq!(revisions, vec![1, 2, 3, 5]);
    let values: Vec<i64> = renderer.snapshots().iter().map(|c| c.value).collect();
    assert_eq!(values, vec![0, 1, 2, 2]);

    handle.cancel();
}
