//! Live Runtime Library
//!
//! Server-driven reactive UI runtime. Each connected client owns a session
//! whose state (the snapshot) lives on the server; client events and
//! server-originated messages are dispatched to registered handlers that
//! compute the next snapshot, which is then re-rendered and pushed back over
//! the client's connection.
//!
//! # Architecture
//!
//! ```text
//! transport ──OnConnect/OnDisconnect──▶ SessionSupervisor
//!     │                                   └── SessionActor (per session)
//!     └──client events──────────────────────▶ inbox ─▶ HandlerRegistry ─▶ Renderer ─▶ sink
//!
//! PeriodicPublisher / handlers ──▶ BroadcastHub ──self(topic, payload)──▶ every inbox
//! ```
//!
//! # Key Design Decisions
//!
//! - **Actor per session**: sequential consistency of the snapshot without locks
//! - **Read-only registry**: handlers are registered once at startup
//! - **Hub holds weak senders**: it enqueues messages and never sees a snapshot
//! - **Resumable sessions**: a terminated session's snapshot is retained for
//!   reconnects with the same signed identity cookie
//!
//! # Modules
//!
//! - [`actors`] - Session supervisor and session actors
//! - [`config`] - Runtime configuration from environment
//! - [`errors`] - Error types
//! - [`hub`] - Broadcast hub
//! - [`identity`] - Signed session identity cookies
//! - [`observability`] - Metrics and health endpoints
//! - [`publisher`] - Periodic and one-shot publishers
//! - [`registry`] - Handler registry and handler context
//! - [`render`] - Render pipeline contract
//! - [`store`] - Retained snapshots for resume
//! - [`types`] - Session identity and event parameters

pub mod actors;
pub mod config;
pub mod errors;
pub mod hub;
pub mod identity;
pub mod observability;
pub mod publisher;
pub mod registry;
pub mod render;
pub mod store;
pub mod types;

pub use actors::{
    ConnectResult, Event, SessionActorHandle, SessionRuntime, SessionSupervisorHandle,
    SnapshotOrigin,
};
pub use config::RuntimeConfig;
pub use errors::{HandlerError, LiveError};
pub use hub::BroadcastHub;
pub use publisher::PeriodicPublisher;
pub use registry::{HandlerContext, HandlerRegistry, MountContext};
pub use render::{OutputSink, RenderContext, RenderError, RenderedFrame, Renderer};
pub use types::{Params, SessionId};
