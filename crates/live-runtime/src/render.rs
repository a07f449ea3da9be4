//! Render pipeline contract.
//!
//! The runtime treats rendering as an opaque function from snapshot to a
//! presentation payload. After every accepted snapshot the session actor
//! calls the [`Renderer`] and pushes the result into the session's
//! [`OutputSink`]; diffing and transport framing live on the far side of
//! the sink.

use crate::types::SessionId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Context passed to a renderer alongside the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    /// Session being rendered.
    pub session_id: SessionId,
    /// Revision of the snapshot being rendered.
    pub revision: u64,
}

/// Error produced by a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template could not be expanded.
    #[error("Template error: {0}")]
    Template(String),

    /// The snapshot could not be serialized for the view.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Turns a snapshot into a presentation payload.
///
/// Implementations must be pure with respect to the snapshot: the same
/// snapshot renders the same payload.
pub trait Renderer<S>: Send + Sync + 'static {
    /// Render the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the payload cannot be produced. The session
    /// keeps its new snapshot and its previous frame stays on screen.
    fn render(&self, ctx: &RenderContext, snapshot: &S) -> Result<String, RenderError>;
}

/// A rendered payload ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    /// Session the frame belongs to.
    pub session_id: SessionId,
    /// Revision of the snapshot that produced this frame.
    pub revision: u64,
    /// Presentation payload.
    pub body: String,
}

/// Channel carrying rendered frames to a session's transport.
pub type OutputSink = mpsc::Sender<RenderedFrame>;
