//! Thermostat snapshot.

use serde::Serialize;

/// Temperature every new session starts at.
pub const INITIAL_TEMPERATURE: f32 = 19.5;

/// Revision counter bumped by the `reload` topic; the client reloads the
/// page when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveReload {
    pub revision: u32,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self { revision: 1 }
    }
}

/// Per-session thermostat state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermoModel {
    /// User name from the connect query string.
    pub name: String,
    /// Current set point in degrees Celsius.
    pub temperature: f32,
    /// Last status line received from any session.
    pub status: String,
    pub live_reload: LiveReload,
    /// Last clock tick.
    pub time: String,
}

impl ThermoModel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temperature: INITIAL_TEMPERATURE,
            status: String::new(),
            live_reload: LiveReload::default(),
            time: String::new(),
        }
    }

    /// Copy with the temperature moved by `delta`.
    #[must_use]
    pub fn adjusted(&self, delta: f32) -> Self {
        Self {
            temperature: self.temperature + delta,
            ..self.clone()
        }
    }
}
