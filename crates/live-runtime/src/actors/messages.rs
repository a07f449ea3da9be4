//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::LiveError;
use crate::render::OutputSink;
use crate::types::{Params, SessionId};

use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;

use super::session::SessionActorHandle;
use super::supervisor::ConnectedSession;

/// An event processed by a session actor.
///
/// Client events and self-messages go through the same inbox and the same
/// dispatch path; only the registry namespace differs.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Event originating from the client connection.
    Client { name: String, params: Params },
    /// Server-originated message injected into the session's own inbox.
    SelfMessage { topic: String, payload: Value },
}

impl Event {
    /// Build a client event.
    #[must_use]
    pub fn client(name: impl Into<String>, params: Params) -> Self {
        Event::Client {
            name: name.into(),
            params,
        }
    }

    /// Build a self-message.
    #[must_use]
    pub fn self_message(topic: impl Into<String>, payload: Value) -> Self {
        Event::SelfMessage {
            topic: topic.into(),
            payload,
        }
    }

    /// Event name or topic.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Event::Client { name, .. } => name,
            Event::SelfMessage { topic, .. } => topic,
        }
    }

    /// Source of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Client { .. } => EventKind::Client,
            Event::SelfMessage { .. } => EventKind::SelfMessage,
        }
    }
}

/// Source of an event, for labels and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Client,
    SelfMessage,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Client => "client",
            EventKind::SelfMessage => "self",
        }
    }
}

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage<S> {
    /// Client event or self-message to dispatch.
    Event(Event),

    /// Return the current snapshot, resuming or mounting one if needed.
    GetOrInit {
        /// Response channel for the snapshot.
        respond_to: oneshot::Sender<Result<SnapshotOutcome<S>, LiveError>>,
    },

    /// Get current session state (for debugging/health).
    GetState {
        /// Response channel for session state.
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Messages sent to `SessionSupervisor`.
#[derive(Debug)]
pub enum SupervisorMessage<S> {
    /// A connection mounted for the given session identity.
    Connect {
        session_id: SessionId,
        /// Mount parameters (query string of the connecting page).
        params: Params,
        /// Where rendered frames for this session are pushed.
        sink: OutputSink,
        /// Response channel for the session handle and connection generation.
        respond_to: oneshot::Sender<Result<ConnectedSession<S>, LiveError>>,
    },

    /// The connection for a session closed.
    Disconnect {
        session_id: SessionId,
        /// Generation returned by the matching connect.
        generation: u64,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), LiveError>>,
    },

    /// Look up a live session.
    GetSession {
        session_id: SessionId,
        /// Response channel for the session handle.
        respond_to: oneshot::Sender<Result<SessionActorHandle<S>, LiveError>>,
    },

    /// Get current supervisor status (for health checks).
    GetStatus {
        /// Response channel for supervisor status.
        respond_to: oneshot::Sender<SupervisorStatus>,
    },

    /// Initiate graceful shutdown.
    Shutdown {
        /// Deadline for draining sessions.
        deadline: Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), LiveError>>,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Where a session's snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// The actor already held a snapshot.
    Current,
    /// Recovered from the snapshot store (same identity reconnected).
    Resumed,
    /// Produced by the mount handler.
    Fresh,
}

/// Result of `GetOrInit`.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome<S> {
    /// The session's current snapshot.
    pub snapshot: S,
    /// How it was obtained.
    pub origin: SnapshotOrigin,
}

/// Current state of a session (for debugging/health).
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session ID.
    pub session_id: SessionId,
    /// Whether a snapshot has been established.
    pub has_snapshot: bool,
    /// Number of accepted snapshots (mount and resume included).
    pub revision: u64,
    /// Revision of the last frame successfully rendered.
    pub rendered_revision: Option<u64>,
    /// Events dispatched (accepted or not).
    pub events_processed: u64,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Status of the `SessionSupervisor`.
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    /// Live sessions.
    pub session_count: usize,
    /// Hub subscribers (should match `session_count`).
    pub subscriber_count: usize,
    /// Snapshots held for resume.
    pub retained_snapshots: usize,
    /// Whether the supervisor is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}
