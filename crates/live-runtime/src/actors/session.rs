//! `SessionActor` - per-session actor that owns the session's snapshot.
//!
//! Each `SessionActor`:
//! - Is the only reader and writer of its snapshot
//! - Processes client events and self-messages one at a time, in arrival order
//! - Mounts (or resumes) its snapshot lazily on first contact
//! - Renders after every accepted snapshot and pushes the frame to its sink
//!
//! # Termination
//!
//! On cancellation or when every handle is dropped the actor:
//! 1. Unsubscribes from the broadcast hub
//! 2. Closes its inbox and discards anything still queued
//! 3. Hands its snapshot to the snapshot store for a later resume

use crate::config::RuntimeConfig;
use crate::errors::LiveError;
use crate::hub::{self, BroadcastHub};
use crate::observability::metrics;
use crate::registry::{HandlerContext, HandlerRegistry, MountContext};
use crate::render::{OutputSink, RenderContext, RenderedFrame, Renderer};
use crate::store::{MemorySnapshotStore, SnapshotStore};
use crate::types::{Params, SessionId};

use super::messages::{
    Event, SessionMessage, SessionState, SnapshotOrigin, SnapshotOutcome,
};
use super::metrics::{ActorMetrics, MailboxMonitor};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `SessionActor`.
pub struct SessionActorHandle<S> {
    sender: mpsc::Sender<SessionMessage<S>>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    send_timeout: Duration,
    mailbox: Arc<MailboxMonitor>,
}

impl<S> Clone for SessionActorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancel_token: self.cancel_token.clone(),
            session_id: self.session_id,
            send_timeout: self.send_timeout,
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

impl<S> std::fmt::Debug for SessionActorHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionActorHandle")
            .field("session_id", &self.session_id)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S: Send + 'static> SessionActorHandle<S> {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Enqueue an event.
    ///
    /// Waits at most the configured send timeout when the inbox is full.
    ///
    /// # Errors
    ///
    /// `DeliveryDropped` if the inbox stayed full or the session is gone.
    pub async fn submit(&self, event: Event) -> Result<(), LiveError> {
        hub::enqueue(
            &self.sender,
            &self.mailbox,
            SessionMessage::Event(event),
            self.send_timeout,
        )
        .await
        .map_err(|reason| LiveError::DeliveryDropped {
            session_id: self.session_id.to_string(),
            reason,
        })
    }

    /// Enqueue a client event.
    pub async fn client_event(
        &self,
        name: impl Into<String>,
        params: Params,
    ) -> Result<(), LiveError> {
        self.submit(Event::client(name, params)).await
    }

    /// Return the current snapshot, resuming or mounting one if there is none.
    ///
    /// Concurrent callers are serialized through the inbox: the mount handler
    /// runs at most once and every caller sees the same snapshot.
    pub async fn get_or_init_snapshot(&self) -> Result<SnapshotOutcome<S>, LiveError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::GetOrInit { respond_to: tx })
            .await
            .map_err(|_| LiveError::SessionNotFound(self.session_id.to_string()))?;
        self.mailbox.record_enqueue();

        rx.await
            .map_err(|_| LiveError::SessionNotFound(self.session_id.to_string()))?
    }

    /// Get current session state.
    pub async fn get_state(&self) -> Result<SessionState, LiveError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| LiveError::SessionNotFound(self.session_id.to_string()))?;
        self.mailbox.record_enqueue();

        rx.await
            .map_err(|e| LiveError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the actor's inbox has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Shared collaborators of every session actor.
pub struct SessionRuntime<S> {
    registry: Arc<HandlerRegistry<S>>,
    renderer: Arc<dyn Renderer<S>>,
    hub: BroadcastHub<S>,
    store: Arc<dyn SnapshotStore<S>>,
    metrics: Arc<ActorMetrics>,
    inbox_capacity: usize,
}

impl<S> Clone for SessionRuntime<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            renderer: Arc::clone(&self.renderer),
            hub: self.hub.clone(),
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            inbox_capacity: self.inbox_capacity,
        }
    }
}

impl<S: Clone + Send + 'static> SessionRuntime<S> {
    /// Assemble a runtime from explicit collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<HandlerRegistry<S>>,
        renderer: Arc<dyn Renderer<S>>,
        hub: BroadcastHub<S>,
        store: Arc<dyn SnapshotStore<S>>,
        metrics: Arc<ActorMetrics>,
        inbox_capacity: usize,
    ) -> Self {
        Self {
            registry,
            renderer,
            hub,
            store,
            metrics,
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    /// Assemble a runtime with an in-memory snapshot store and a fresh hub
    /// sized from `config`.
    #[must_use]
    pub fn from_config(
        config: &RuntimeConfig,
        registry: Arc<HandlerRegistry<S>>,
        renderer: Arc<dyn Renderer<S>>,
    ) -> Self {
        Self::new(
            registry,
            renderer,
            BroadcastHub::new(config.inbox_send_timeout),
            Arc::new(MemorySnapshotStore::new(config.session_retention)),
            ActorMetrics::new(),
            config.inbox_capacity,
        )
    }

    /// The broadcast hub shared by every session.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub<S> {
        &self.hub
    }

    /// The snapshot store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SnapshotStore<S>> {
        &self.store
    }

    /// Shared actor metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor<S> {
    /// Session ID.
    session_id: SessionId,
    /// Message receiver.
    receiver: mpsc::Receiver<SessionMessage<S>>,
    /// Cancellation token (child of the supervisor's token).
    cancel_token: CancellationToken,
    /// Shared collaborators.
    runtime: SessionRuntime<S>,
    /// Where rendered frames go.
    sink: OutputSink,
    /// Parameters handed to the mount handler.
    mount_params: Params,
    /// Current snapshot. `None` until first contact.
    snapshot: Option<S>,
    /// Number of accepted snapshots.
    revision: u64,
    /// Revision of the last frame that reached the sink.
    rendered_revision: Option<u64>,
    /// Events dispatched.
    events_processed: u64,
    /// Mailbox monitor, shared with handles and the hub.
    mailbox: Arc<MailboxMonitor>,
}

impl<S: Clone + Send + 'static> SessionActor<S> {
    /// Spawn a new session actor and subscribe it to the hub.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Stable session identity
    /// * `mount_params` - Parameters for the mount handler
    /// * `sink` - Destination of rendered frames
    /// * `cancel_token` - Cancellation token (child of the supervisor's token)
    /// * `runtime` - Registry, renderer, hub and store
    pub fn spawn(
        session_id: SessionId,
        mount_params: Params,
        sink: OutputSink,
        cancel_token: CancellationToken,
        runtime: SessionRuntime<S>,
    ) -> (SessionActorHandle<S>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(runtime.inbox_capacity);
        let mailbox = Arc::new(MailboxMonitor::for_session(
            session_id.to_string(),
            runtime.inbox_capacity,
        ));

        runtime
            .hub
            .subscribe(session_id, &sender, Arc::clone(&mailbox));
        runtime.metrics.session_created();

        let handle = SessionActorHandle {
            sender,
            cancel_token: cancel_token.clone(),
            session_id,
            send_timeout: runtime.hub.send_timeout(),
            mailbox: Arc::clone(&mailbox),
        };

        let actor = Self {
            session_id,
            receiver,
            cancel_token,
            runtime,
            sink,
            mount_params,
            snapshot: None,
            revision: 0,
            rendered_revision: None,
            events_processed: 0,
            mailbox,
        };

        let task_handle = tokio::spawn(actor.run());

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "live.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        debug!(target: "live.actor.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "live.actor.session",
                        "SessionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.runtime.metrics.record_message_processed();
                        }
                        None => {
                            debug!(
                                target: "live.actor.session",
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    async fn handle_message(&mut self, message: SessionMessage<S>) {
        match message {
            SessionMessage::Event(event) => self.handle_event(event).await,
            SessionMessage::GetOrInit { respond_to } => {
                let result = self.get_or_init().await;
                if let Err(ref e) = result {
                    self.report("mount", e);
                }
                let _ = respond_to.send(result);
            }
            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    async fn get_or_init(&mut self) -> Result<SnapshotOutcome<S>, LiveError> {
        let origin = self.ensure_snapshot().await?;
        let snapshot = self
            .snapshot
            .clone()
            .ok_or_else(|| LiveError::Internal("snapshot missing after init".to_string()))?;
        Ok(SnapshotOutcome { snapshot, origin })
    }

    /// Establish the snapshot if there is none: resume from the store, else mount.
    async fn ensure_snapshot(&mut self) -> Result<SnapshotOrigin, LiveError> {
        if self.snapshot.is_some() {
            return Ok(SnapshotOrigin::Current);
        }

        let (snapshot, origin) = match self.runtime.store.take(&self.session_id) {
            Some(snapshot) => (snapshot, SnapshotOrigin::Resumed),
            None => {
                let ctx = MountContext {
                    session_id: self.session_id,
                    params: self.mount_params.clone(),
                };
                (self.runtime.registry.mount(&ctx)?, SnapshotOrigin::Fresh)
            }
        };

        info!(
            target: "live.actor.session",
            session_id = %self.session_id,
            origin = ?origin,
            "Session snapshot established"
        );

        self.accept(snapshot).await;
        Ok(origin)
    }

    async fn handle_event(&mut self, event: Event) {
        let start = Instant::now();
        let kind = event.kind();
        let name = event.name().to_string();
        self.events_processed += 1;

        let result = self.apply(event).await;
        metrics::record_event_latency(kind.as_str(), start.elapsed());

        if let Err(e) = result {
            self.report(&name, &e);
        }
    }

    /// Resolve, run, accept, render, then publish whatever the handler queued.
    async fn apply(&mut self, event: Event) -> Result<(), LiveError> {
        self.ensure_snapshot().await?;

        let mut ctx = HandlerContext::new(self.session_id, self.runtime.hub.clone());
        let next = {
            let current = self
                .snapshot
                .as_ref()
                .ok_or_else(|| LiveError::Internal("snapshot missing after init".to_string()))?;
            self.runtime.registry.dispatch(&mut ctx, &event, current)?
        };

        self.accept(next).await;
        ctx.flush().await;
        Ok(())
    }

    /// Store `next` as the current snapshot and render it.
    async fn accept(&mut self, next: S) {
        self.revision += 1;
        self.snapshot = Some(next);
        self.render().await;
    }

    async fn render(&mut self) {
        let ctx = RenderContext {
            session_id: self.session_id,
            revision: self.revision,
        };

        let start = Instant::now();
        let rendered = match self.snapshot.as_ref() {
            Some(snapshot) => self.runtime.renderer.render(&ctx, snapshot),
            None => return,
        };
        metrics::record_render_duration(start.elapsed());

        let body = match rendered {
            Ok(body) => body,
            Err(e) => {
                // Previous frame stays on screen
                self.report("render", &LiveError::RenderFailure(e.to_string()));
                return;
            }
        };

        let frame = RenderedFrame {
            session_id: self.session_id,
            revision: self.revision,
            body,
        };
        match self
            .sink
            .send_timeout(frame, self.runtime.hub.send_timeout())
            .await
        {
            Ok(()) => self.rendered_revision = Some(self.revision),
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(
                    target: "live.actor.session",
                    session_id = %self.session_id,
                    revision = self.revision,
                    "Output sink full, frame dropped"
                );
                metrics::record_delivery_dropped("sink_full");
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(
                    target: "live.actor.session",
                    session_id = %self.session_id,
                    "Output sink closed, frame discarded"
                );
            }
        }
    }

    fn report(&self, event: &str, err: &LiveError) {
        warn!(
            target: "live.actor.session",
            session_id = %self.session_id,
            event = %event,
            kind = err.kind(),
            error = %err,
            "Event not applied, snapshot unchanged"
        );
        metrics::record_session_error(err.kind());
    }

    fn state(&self) -> SessionState {
        SessionState {
            session_id: self.session_id,
            has_snapshot: self.snapshot.is_some(),
            revision: self.revision,
            rendered_revision: self.rendered_revision,
            events_processed: self.events_processed,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn shutdown(&mut self) {
        self.runtime.hub.unsubscribe(&self.session_id);

        self.receiver.close();
        let mut discarded = 0_usize;
        while self.receiver.try_recv().is_ok() {
            self.mailbox.record_dequeue();
            discarded += 1;
        }

        let retained = match self.snapshot.take() {
            Some(snapshot) => {
                self.runtime.store.save(self.session_id, snapshot);
                true
            }
            None => false,
        };

        self.runtime.metrics.session_removed();

        info!(
            target: "live.actor.session",
            session_id = %self.session_id,
            revision = self.revision,
            events_processed = self.events_processed,
            discarded,
            retained,
            "SessionActor stopped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::HandlerError;
    use crate::render::RenderError;

    struct Plain;

    impl Renderer<i64> for Plain {
        fn render(&self, _ctx: &RenderContext, snapshot: &i64) -> Result<String, RenderError> {
            if *snapshot < 0 {
                return Err(RenderError::Template("negative".to_string()));
            }
            Ok(snapshot.to_string())
        }
    }

    fn runtime() -> SessionRuntime<i64> {
        let registry = HandlerRegistry::builder()
            .mount(|_| Ok(0))
            .on_event("inc", |_, n, _| Ok(n + 1))
            .on_event("negate", |_, n, _| Ok(-n))
            .on_event("fail", |_, _, _| Err(HandlerError::Rejected("no".to_string())))
            .build()
            .unwrap();
        SessionRuntime::new(
            registry,
            Arc::new(Plain),
            BroadcastHub::new(Duration::from_millis(20)),
            Arc::new(MemorySnapshotStore::new(Duration::from_secs(30))),
            ActorMetrics::new(),
            16,
        )
    }

    #[tokio::test]
    async fn test_session_actor_spawn_and_cancel() {
        let runtime = runtime();
        let (sink, _frames) = mpsc::channel(16);
        let id = SessionId::new();

        let (handle, task) =
            SessionActor::spawn(id, Params::new(), sink, CancellationToken::new(), runtime.clone());

        assert_eq!(handle.session_id(), id);
        assert!(runtime.hub().is_subscribed(&id));
        assert_eq!(runtime.metrics().session_count(), 1);

        handle.cancel();
        task.await.unwrap();

        assert!(!runtime.hub().is_subscribed(&id));
        assert_eq!(runtime.metrics().session_count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_init_mounts_then_returns_current() {
        let (sink, mut frames) = mpsc::channel(16);
        let (handle, _task) = SessionActor::spawn(
            SessionId::new(),
            Params::new(),
            sink,
            CancellationToken::new(),
            runtime(),
        );

        let first = handle.get_or_init_snapshot().await.unwrap();
        assert_eq!(first.snapshot, 0);
        assert_eq!(first.origin, SnapshotOrigin::Fresh);

        let second = handle.get_or_init_snapshot().await.unwrap();
        assert_eq!(second.snapshot, 0);
        assert_eq!(second.origin, SnapshotOrigin::Current);

        // Only the mount rendered
        assert_eq!(frames.recv().await.unwrap().body, "0");
        assert!(frames.try_recv().is_err());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_failures_leave_snapshot_unchanged() {
        let (sink, mut frames) = mpsc::channel(16);
        let (handle, _task) = SessionActor::spawn(
            SessionId::new(),
            Params::new(),
            sink,
            CancellationToken::new(),
            runtime(),
        );

        handle.client_event("inc", Params::new()).await.unwrap();
        handle.client_event("fail", Params::new()).await.unwrap();
        handle.client_event("no-such-event", Params::new()).await.unwrap();
        handle.client_event("inc", Params::new()).await.unwrap();

        let outcome = handle.get_or_init_snapshot().await.unwrap();
        assert_eq!(outcome.snapshot, 2);

        let bodies: Vec<String> = std::iter::from_fn(|| frames.try_recv().ok())
            .map(|f| f.body)
            .collect();
        assert_eq!(bodies, vec!["0", "1", "2"]);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_render_failure_keeps_new_snapshot() {
        let (sink, mut frames) = mpsc::channel(16);
        let (handle, _task) = SessionActor::spawn(
            SessionId::new(),
            Params::new(),
            sink,
            CancellationToken::new(),
            runtime(),
        );

        handle.client_event("inc", Params::new()).await.unwrap();
        handle.client_event("negate", Params::new()).await.unwrap();

        let state = handle.get_state().await.unwrap();
        // mount + inc + negate accepted, last render failed
        assert_eq!(state.revision, 3);
        assert_eq!(state.rendered_revision, Some(2));
        assert_eq!(handle.get_or_init_snapshot().await.unwrap().snapshot, -1);

        let last = std::iter::from_fn(|| frames.try_recv().ok()).last().unwrap();
        assert_eq!(last.body, "1");

        handle.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_retains_snapshot_for_resume() {
        let runtime = runtime();
        let id = SessionId::new();
        let (sink, _frames) = mpsc::channel(16);

        let (handle, task) =
            SessionActor::spawn(id, Params::new(), sink, CancellationToken::new(), runtime.clone());
        handle.client_event("inc", Params::new()).await.unwrap();
        handle.get_state().await.unwrap();
        handle.cancel();
        task.await.unwrap();

        assert_eq!(runtime.store().len(), 1);

        let (sink, _frames) = mpsc::channel(16);
        let (handle, _task) =
            SessionActor::spawn(id, Params::new(), sink, CancellationToken::new(), runtime.clone());
        let outcome = handle.get_or_init_snapshot().await.unwrap();
        assert_eq!(outcome.snapshot, 1);
        assert_eq!(outcome.origin, SnapshotOrigin::Resumed);
        assert!(runtime.store().is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_dropped() {
        let (sink, _frames) = mpsc::channel(16);
        let (handle, task) = SessionActor::spawn(
            SessionId::new(),
            Params::new(),
            sink,
            CancellationToken::new(),
            runtime(),
        );
        handle.cancel();
        task.await.unwrap();

        let result = handle.client_event("inc", Params::new()).await;
        assert!(matches!(result, Err(LiveError::DeliveryDropped { .. })));
        assert!(matches!(
            handle.get_or_init_snapshot().await,
            Err(LiveError::SessionNotFound(_))
        ));
    }
}
