//! `SessionSupervisor` - singleton owner of all session actors.
//!
//! The `SessionSupervisor` is the top-level actor of the runtime:
//!
//! - Singleton per process
//! - Maps session identities to live `SessionActor` instances
//! - Translates transport callbacks (connect, disconnect) into actor lifecycle
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//! - Sweeps expired snapshots out of the snapshot store
//!
//! # Reconnects
//!
//! At most one actor runs per session identity. A connect for an identity
//! that is still live (or still stopping) first waits for the previous
//! actor to terminate, so its snapshot lands in the store and the new actor
//! resumes from it. Disconnects carry the generation returned by connect; a
//! stale disconnect from an older connection is ignored.
//!
//! # Graceful Shutdown
//!
//! On shutdown the supervisor:
//! 1. Stops accepting connects
//! 2. Cancels every session actor
//! 3. Waits for them up to the deadline, aborting stragglers
//! 4. Cancels the root token

use crate::errors::LiveError;
use crate::hub::BroadcastHub;
use crate::observability::metrics;
use crate::render::OutputSink;
use crate::types::{Params, SessionId};

use super::messages::{SnapshotOrigin, SupervisorMessage, SupervisorStatus};
use super::metrics::{ActorType, MailboxMonitor};
use super::session::{SessionActor, SessionActorHandle, SessionRuntime};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the supervisor mailbox.
const SUPERVISOR_CHANNEL_BUFFER: usize = 1000;

/// How long a connect waits for the previous actor of the same session.
const SESSION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline used when the root token is cancelled without a shutdown request.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Interval of the snapshot retention sweep.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// A session handed to a transport by `on_connect`.
#[derive(Debug)]
pub struct ConnectedSession<S> {
    /// Handle to the session actor.
    pub handle: SessionActorHandle<S>,
    /// Identifies this connection for the matching disconnect.
    pub generation: u64,
}

/// Result of `on_connect`.
#[derive(Debug)]
pub struct ConnectResult<S> {
    /// Handle to the session actor. Submit client events here.
    pub handle: SessionActorHandle<S>,
    /// Pass back to `on_disconnect`.
    pub generation: u64,
    /// The session's snapshot after connect.
    pub snapshot: S,
    /// Whether the snapshot was resumed or freshly mounted.
    pub origin: SnapshotOrigin,
}

/// Handle to the `SessionSupervisor`.
///
/// This is the public interface for transports. All methods are async and
/// return results via oneshot channels.
pub struct SessionSupervisorHandle<S> {
    sender: mpsc::Sender<SupervisorMessage<S>>,
    cancel_token: CancellationToken,
    draining: CancellationToken,
    hub: BroadcastHub<S>,
    mailbox: Arc<MailboxMonitor>,
}

impl<S> Clone for SessionSupervisorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancel_token: self.cancel_token.clone(),
            draining: self.draining.clone(),
            hub: self.hub.clone(),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

impl<S: Clone + Send + 'static> SessionSupervisorHandle<S> {
    /// Spawn the supervisor and return a handle to it.
    #[must_use]
    pub fn new(runtime: SessionRuntime<S>) -> Self {
        let (sender, receiver) = mpsc::channel(SUPERVISOR_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        // Child of the root so an immediate cancel also reads as draining
        let draining = cancel_token.child_token();
        let mailbox = Arc::new(MailboxMonitor::for_supervisor());
        let hub = runtime.hub().clone();

        let actor = SessionSupervisor {
            receiver,
            cancel_token: cancel_token.clone(),
            draining: draining.clone(),
            runtime,
            sessions: HashMap::new(),
            stopping: HashMap::new(),
            next_generation: 0,
            accepting_new: true,
            mailbox: Arc::clone(&mailbox),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            draining,
            hub,
            mailbox,
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SupervisorMessage<S>,
    ) -> Result<T, LiveError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| LiveError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();

        rx.await
            .map_err(|e| LiveError::Internal(format!("response receive failed: {e}")))
    }

    /// A connection mounted for `session_id`.
    ///
    /// Spawns (or replaces) the session actor, then resumes or mounts its
    /// snapshot. Frames rendered from now on go to `sink`.
    pub async fn on_connect(
        &self,
        session_id: SessionId,
        params: Params,
        sink: OutputSink,
    ) -> Result<ConnectResult<S>, LiveError> {
        let connected = self
            .call(|respond_to| SupervisorMessage::Connect {
                session_id,
                params,
                sink,
                respond_to,
            })
            .await??;

        let outcome = connected.handle.get_or_init_snapshot().await?;
        Ok(ConnectResult {
            handle: connected.handle,
            generation: connected.generation,
            snapshot: outcome.snapshot,
            origin: outcome.origin,
        })
    }

    /// A client event arrived for `session_id`.
    ///
    /// Transports that kept the handle from `on_connect` should submit to it
    /// directly and skip the supervisor hop.
    pub async fn on_client_event(
        &self,
        session_id: SessionId,
        name: impl Into<String>,
        params: Params,
    ) -> Result<(), LiveError> {
        self.get_session(session_id)
            .await?
            .client_event(name, params)
            .await
    }

    /// The connection identified by `generation` closed.
    pub async fn on_disconnect(
        &self,
        session_id: SessionId,
        generation: u64,
    ) -> Result<(), LiveError> {
        self.call(|respond_to| SupervisorMessage::Disconnect {
            session_id,
            generation,
            respond_to,
        })
        .await?
    }

    /// Look up a live session.
    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionActorHandle<S>, LiveError> {
        self.call(|respond_to| SupervisorMessage::GetSession {
            session_id,
            respond_to,
        })
        .await?
    }

    /// Get the current supervisor status.
    pub async fn get_status(&self) -> Result<SupervisorStatus, LiveError> {
        self.call(|respond_to| SupervisorMessage::GetStatus { respond_to })
            .await
    }

    /// Stop accepting connects and drain every session within `deadline`.
    ///
    /// Returns once all session actors have stopped or been aborted.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), LiveError> {
        self.call(|respond_to| SupervisorMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// The broadcast hub shared by every session.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub<S> {
        &self.hub
    }

    /// Cancel the supervisor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the supervisor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether shutdown has begun. Set before any session is stopped, so a
    /// transport seeing its session end can tell shutdown from replacement.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the supervisor.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed session.
struct ManagedSession<S> {
    /// Handle to the session actor.
    handle: SessionActorHandle<S>,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Connection generation.
    generation: u64,
    /// When the current connection mounted.
    connected_at: Instant,
}

/// The `SessionSupervisor` implementation.
pub struct SessionSupervisor<S> {
    /// Message receiver.
    receiver: mpsc::Receiver<SupervisorMessage<S>>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Cancelled when shutdown begins.
    draining: CancellationToken,
    /// Shared collaborators for spawned sessions.
    runtime: SessionRuntime<S>,
    /// Live sessions by ID.
    sessions: HashMap<SessionId, ManagedSession<S>>,
    /// Cancelled sessions whose task has not been reaped yet.
    stopping: HashMap<SessionId, JoinHandle<()>>,
    /// Last generation handed out.
    next_generation: u64,
    /// Whether connects are accepted.
    accepting_new: bool,
    /// Mailbox monitor.
    mailbox: Arc<MailboxMonitor>,
}

impl<S: Clone + Send + 'static> SessionSupervisor<S> {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "live.actor.supervisor")]
    async fn run(mut self) {
        info!(target: "live.actor.supervisor", "SessionSupervisor started");

        let mut sweep = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Check for terminated session actors
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "live.actor.supervisor",
                        "SessionSupervisor received cancellation signal"
                    );
                    self.graceful_shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
                    break;
                }

                _ = sweep.tick() => {
                    self.sweep().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "live.actor.supervisor",
                                "SessionSupervisor channel closed, exiting"
                            );
                            self.graceful_shutdown(DEFAULT_SHUTDOWN_DEADLINE).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "live.actor.supervisor",
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionSupervisor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: SupervisorMessage<S>) {
        match message {
            SupervisorMessage::Connect {
                session_id,
                params,
                sink,
                respond_to,
            } => {
                let result = self.connect(session_id, params, sink).await;
                let _ = respond_to.send(result);
            }

            SupervisorMessage::Disconnect {
                session_id,
                generation,
                respond_to,
            } => {
                self.disconnect(session_id, generation);
                let _ = respond_to.send(Ok(()));
            }

            SupervisorMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self
                    .sessions
                    .get(&session_id)
                    .map(|managed| managed.handle.clone())
                    .ok_or_else(|| LiveError::SessionNotFound(session_id.to_string()));
                let _ = respond_to.send(result);
            }

            SupervisorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            SupervisorMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.graceful_shutdown(deadline).await;
                let _ = respond_to.send(Ok(()));
                self.cancel_token.cancel();
            }
        }
    }

    /// Spawn the actor for a newly connected session.
    async fn connect(
        &mut self,
        session_id: SessionId,
        params: Params,
        sink: OutputSink,
    ) -> Result<ConnectedSession<S>, LiveError> {
        if !self.accepting_new {
            return Err(LiveError::Draining);
        }

        // One actor per identity: the previous one must be gone first
        if let Some(previous) = self.sessions.remove(&session_id) {
            debug!(
                target: "live.actor.supervisor",
                session_id = %session_id,
                generation = previous.generation,
                "Replacing live session"
            );
            previous.handle.cancel();
            self.await_stop(session_id, previous.task_handle).await;
        }
        if let Some(task_handle) = self.stopping.remove(&session_id) {
            self.await_stop(session_id, task_handle).await;
        }

        let session_token = self.cancel_token.child_token();
        let (handle, task_handle) = SessionActor::spawn(
            session_id,
            params,
            sink,
            session_token,
            self.runtime.clone(),
        );

        self.next_generation += 1;
        let generation = self.next_generation;

        self.sessions.insert(
            session_id,
            ManagedSession {
                handle: handle.clone(),
                task_handle,
                generation,
                connected_at: Instant::now(),
            },
        );

        info!(
            target: "live.actor.supervisor",
            session_id = %session_id,
            generation,
            total_sessions = self.sessions.len(),
            "Session connected"
        );

        Ok(ConnectedSession { handle, generation })
    }

    /// Cancel the session if `generation` is still its current connection.
    fn disconnect(&mut self, session_id: SessionId, generation: u64) {
        let is_current = self
            .sessions
            .get(&session_id)
            .is_some_and(|managed| managed.generation == generation);

        if !is_current {
            debug!(
                target: "live.actor.supervisor",
                session_id = %session_id,
                generation,
                "Ignoring disconnect of a replaced connection"
            );
            return;
        }

        if let Some(managed) = self.sessions.remove(&session_id) {
            managed.handle.cancel();
            self.stopping.insert(session_id, managed.task_handle);

            info!(
                target: "live.actor.supervisor",
                session_id = %session_id,
                generation,
                connected_secs = managed.connected_at.elapsed().as_secs(),
                total_sessions = self.sessions.len(),
                "Session disconnected"
            );
        }
    }

    /// Wait for a cancelled session task, aborting it after the stop timeout.
    async fn await_stop(&self, session_id: SessionId, mut task_handle: JoinHandle<()>) {
        match tokio::time::timeout(SESSION_STOP_TIMEOUT, &mut task_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => self.record_abnormal_exit(session_id, &join_error),
            Err(_) => {
                warn!(
                    target: "live.actor.supervisor",
                    session_id = %session_id,
                    "Session actor stop timed out, aborting"
                );
                task_handle.abort();
                self.release_abandoned(session_id);
            }
        }
    }

    /// Clean up after an actor that never reached its own shutdown.
    fn release_abandoned(&self, session_id: SessionId) {
        if !self.sessions.contains_key(&session_id) {
            self.runtime.hub().unsubscribe(&session_id);
        }
        self.runtime.metrics().session_removed();
    }

    fn record_abnormal_exit(&self, session_id: SessionId, join_error: &tokio::task::JoinError) {
        if join_error.is_panic() {
            error!(
                target: "live.actor.supervisor",
                session_id = %session_id,
                error = ?join_error,
                "Session actor panicked - triggering investigation"
            );
            self.runtime.metrics().record_panic(ActorType::Session);
        }
        self.release_abandoned(session_id);
    }

    /// Get current supervisor status.
    fn get_status(&self) -> SupervisorStatus {
        SupervisorStatus {
            session_count: self.sessions.len(),
            subscriber_count: self.runtime.hub().subscriber_count(),
            retained_snapshots: self.runtime.store().len(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Purge expired snapshots and reap stopped sessions.
    async fn sweep(&mut self) {
        let purged = self.runtime.store().purge_expired();
        if purged > 0 {
            debug!(
                target: "live.actor.supervisor",
                purged,
                "Expired session snapshots purged"
            );
            metrics::record_snapshots_purged(purged);
        }

        let finished: Vec<SessionId> = self
            .stopping
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for session_id in finished {
            if let Some(task_handle) = self.stopping.remove(&session_id) {
                if let Err(join_error) = task_handle.await {
                    self.record_abnormal_exit(session_id, &join_error);
                }
            }
        }
    }

    /// Check health of live session actors.
    async fn check_session_health(&mut self) {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for session_id in finished {
            if let Some(managed) = self.sessions.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "live.actor.supervisor",
                            session_id = %session_id,
                            "Session actor exited"
                        );
                    }
                    Err(join_error) => self.record_abnormal_exit(session_id, &join_error),
                }
            }
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self, deadline: Duration) {
        info!(
            target: "live.actor.supervisor",
            session_count = self.sessions.len(),
            stopping = self.stopping.len(),
            deadline_secs = deadline.as_secs(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;
        self.draining.cancel();

        for managed in self.sessions.values() {
            managed.handle.cancel();
        }

        let deadline_at = Instant::now() + deadline;
        let mut tasks: Vec<(SessionId, JoinHandle<()>)> = self
            .sessions
            .drain()
            .map(|(id, managed)| (id, managed.task_handle))
            .collect();
        tasks.extend(self.stopping.drain());

        for (session_id, mut task_handle) in tasks {
            match tokio::time::timeout_at(deadline_at, &mut task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "live.actor.supervisor",
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(join_error)) => self.record_abnormal_exit(session_id, &join_error),
                Err(_) => {
                    warn!(
                        target: "live.actor.supervisor",
                        session_id = %session_id,
                        "Session actor shutdown timed out, aborting"
                    );
                    task_handle.abort();
                    self.release_abandoned(session_id);
                }
            }
        }

        info!(target: "live.actor.supervisor", "Graceful shutdown complete");
    }
}
