//! Liveness and readiness for a live-session server.
//!
//! - `GET /health` answers 200 whenever the process can serve HTTP at all.
//! - `GET /ready` answers 200 only while new websocket sessions are being
//!   accepted, with the current phase as the body.
//!
//! A server starts in [`ServerPhase::Starting`], becomes `Serving` once its
//! supervisor and publishers run, and switches to `Draining` when shutdown
//! begins. Draining is one-way: connected sessions keep running until the
//! supervisor closes them, but a load balancer stops sending new ones.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle phase reported by `/ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerPhase {
    Starting = 0,
    Serving = 1,
    Draining = 2,
}

impl ServerPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServerPhase::Starting => "starting",
            ServerPhase::Serving => "serving",
            ServerPhase::Draining => "draining",
        }
    }
}

/// Shared phase flag behind the health routes.
#[derive(Debug, Default)]
pub struct HealthState {
    phase: AtomicU8,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting sessions. Ignored once draining.
    pub fn mark_serving(&self) {
        let _ = self.phase.compare_exchange(
            ServerPhase::Starting as u8,
            ServerPhase::Serving as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Stop accepting sessions for good.
    pub fn mark_draining(&self) {
        self.phase.store(ServerPhase::Draining as u8, Ordering::SeqCst);
    }

    #[must_use]
    pub fn phase(&self) -> ServerPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => ServerPhase::Starting,
            1 => ServerPhase::Serving,
            _ => ServerPhase::Draining,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == ServerPhase::Serving
    }
}

/// Router serving `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    let phase = state.phase();
    let status = if phase == ServerPhase::Serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, phase.as_str())
}
