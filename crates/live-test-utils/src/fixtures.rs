//! Counter fixture for session tests.
//!
//! `Counter` is a small snapshot with an applied-event log so tests can check
//! both the value and the order in which handlers ran.

use live_runtime::actors::metrics::ActorMetrics;
use live_runtime::errors::HandlerError;
use live_runtime::hub::BroadcastHub;
use live_runtime::registry::HandlerRegistry;
use live_runtime::render::Renderer;
use live_runtime::store::MemorySnapshotStore;
use live_runtime::SessionRuntime;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot used by runtime tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counter {
    /// Current value.
    pub value: i64,
    /// Last status received via broadcast.
    pub status: String,
    /// Names of applied events, in order.
    pub log: Vec<String>,
}

impl Counter {
    fn applied(&self, name: &str, value: i64) -> Self {
        let mut next = self.clone();
        next.value = value;
        next.log.push(name.to_string());
        next
    }
}

/// Counts mount handler invocations.
#[derive(Debug, Clone, Default)]
pub struct MountCounter(Arc<AtomicUsize>);

impl MountCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mounts so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registry for [`Counter`].
///
/// Client events:
/// - `inc` / `dec` - add or subtract one
/// - `add` - add param `by` (fails on a non-numeric value)
/// - `fail` - always fails
/// - `shout` - broadcasts `status` with param `message`, value unchanged
/// - `whisper` - sends `status` with param `message` to this session only
///
/// Self topics:
/// - `status` - stores the payload string in `status`
/// - `tick` - add one
///
/// Mount starts at param `start` (default 0) and counts invocations.
pub fn counter_registry(mounts: &MountCounter) -> Arc<HandlerRegistry<Counter>> {
    let mounts = mounts.clone();
    HandlerRegistry::<Counter>::builder()
        .mount(move |ctx| {
            mounts.hit();
            Ok(Counter {
                value: ctx.params.float("start") as i64,
                ..Counter::default()
            })
        })
        .on_event("inc", |_, c, _| Ok(c.applied("inc", c.value + 1)))
        .on_event("dec", |_, c, _| Ok(c.applied("dec", c.value - 1)))
        .on_event("add", |_, c, params| {
            let by = params
                .try_float("by")
                .ok_or_else(|| HandlerError::InvalidParam {
                    name: "by".to_string(),
                    reason: "not a number".to_string(),
                })?;
            Ok(c.applied("add", c.value + by as i64))
        })
        .on_event("fail", |_, _, _| {
            Err(HandlerError::Rejected("fail always fails".to_string()))
        })
        .on_event("shout", |ctx, c, params| {
            ctx.broadcast("status", params.string("message"));
            Ok(c.applied("shout", c.value))
        })
        .on_event("whisper", |ctx, c, params| {
            ctx.send_self("status", params.string("message"));
            Ok(c.applied("whisper", c.value))
        })
        .on_self("status", |_, c, payload| {
            let status = payload
                .as_str()
                .ok_or_else(|| HandlerError::InvalidPayload {
                    topic: "status".to_string(),
                })?;
            let mut next = c.applied("status", c.value);
            next.status = status.to_string();
            Ok(next)
        })
        .on_self("tick", |_, c, _| Ok(c.applied("tick", c.value + 1)))
        .build()
        .expect("counter registry has a mount handler")
}

/// Runtime with an in-memory store (30s retention), 50ms send timeout and
/// inbox capacity 64.
pub fn test_runtime<S, R>(registry: Arc<HandlerRegistry<S>>, renderer: R) -> SessionRuntime<S>
where
    S: Clone + Send + 'static,
    R: Renderer<S>,
{
    test_runtime_with(registry, renderer, 64, Duration::from_secs(30))
}

/// Runtime with explicit inbox capacity and snapshot retention.
pub fn test_runtime_with<S, R>(
    registry: Arc<HandlerRegistry<S>>,
    renderer: R,
    inbox_capacity: usize,
    retention: Duration,
) -> SessionRuntime<S>
where
    S: Clone + Send + 'static,
    R: Renderer<S>,
{
    SessionRuntime::new(
        registry,
        Arc::new(renderer),
        BroadcastHub::new(Duration::from_millis(50)),
        Arc::new(MemorySnapshotStore::new(retention)),
        ActorMetrics::new(),
        inbox_capacity,
    )
}
