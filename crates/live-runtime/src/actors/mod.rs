//! Actor model implementation for the live runtime.
//!
//! ```text
//! SessionSupervisor (singleton per process)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live session identity)
//!         ├── owns the session snapshot
//!         └── inbox fed by its connection and by the BroadcastHub
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: only the session's own actor reads or writes its snapshot
//! - **CancellationToken propagation**: the supervisor hands child tokens to sessions
//! - **Bounded inboxes**: try, wait up to the send timeout, then drop and report
//! - **Message passing**: all inter-actor communication via `tokio::sync::mpsc` channels
//!
//! # Modules
//!
//! - [`supervisor`] - `SessionSupervisor` singleton that maps identities to actors
//! - [`session`] - `SessionActor` per live session, owns the snapshot
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod messages;
pub mod metrics;
pub mod session;
pub mod supervisor;

pub use messages::*;
pub use metrics::{ActorMetrics, MailboxLevel, MailboxMonitor, MailboxThresholds};
pub use session::{SessionActor, SessionActorHandle, SessionRuntime};
pub use supervisor::{ConnectResult, ConnectedSession, SessionSupervisor, SessionSupervisorHandle};
