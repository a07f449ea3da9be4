//! Observability for the live runtime.
//!
//! # Privacy by Default
//!
//! Actor spans use `#[instrument(skip_all)]` with explicit fields. Event
//! parameters and snapshots are never logged; only event names, topics and
//! session ids are.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `live_sessions_active` | Gauge | none | Live session actors |
//! | `live_event_latency_seconds` | Histogram | `event_kind` | Dispatch + render + flush time |
//! | `live_render_duration_seconds` | Histogram | none | Renderer time |
//! | `live_session_errors_total` | Counter | `kind` | Reported session errors |
//! | `live_broadcasts_total` | Counter | none | Hub publishes |
//! | `live_broadcast_deliveries_total` | Counter | `outcome` | Per-subscriber broadcast outcome |
//! | `live_delivery_dropped_total` | Counter | `reason` | Dropped deliveries |
//! | `live_actor_panics_total` | Counter | `actor_type` | Actor panics (bugs) |
//! | `live_snapshots_purged_total` | Counter | none | Expired retained snapshots |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState, ServerPhase};
pub use metrics::init_metrics_recorder;
