//! Thermostat
//!
//! A shared thermostat page served over the live session runtime. Every
//! browser tab holds a session with its own temperature; status lines and
//! the clock are broadcast to all of them.
//!
//! # Architecture
//!
//! ```text
//! browser --ws--> ws::run_connection --Submit--> SessionActor<ThermoModel>
//!    ^                                               |
//!    +------------------ {"html": ...} <-- ThermostatView
//!
//! clock / reload publishers --> BroadcastHub --> every SessionActor
//! ```
//!
//! # Modules
//!
//! - `config` - Environment configuration
//! - `handlers` - Event and self-topic handlers
//! - `model` - The `ThermoModel` snapshot
//! - `publishers` - Clock and reload publishers
//! - `routes` - Axum router and application state
//! - `view` - Handlebars renderer
//! - `ws` - Websocket transport

pub mod config;
pub mod handlers;
pub mod model;
pub mod publishers;
pub mod routes;
pub mod view;
pub mod ws;

pub use handlers::thermostat_registry;
pub use model::ThermoModel;
pub use routes::{build_routes, AppState};
pub use view::ThermostatView;
