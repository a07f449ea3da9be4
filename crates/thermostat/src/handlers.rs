//! Thermostat event handlers.
//!
//! | Client event  | Effect |
//! |---------------|--------|
//! | `temp-up`     | +0.1 C |
//! | `temp-down`   | -0.1 C |
//! | `temp-change` | + param `temperature`, broadcasts a `status` line |
//! | `save`        | broadcasts `status` = "<name>: <message>" |
//!
//! | Self topic | Effect |
//! |------------|--------|
//! | `reload`   | bumps the live reload revision |
//! | `status`   | status = payload |
//! | `time`     | time = payload |

use crate::model::ThermoModel;

use live_runtime::{HandlerError, HandlerRegistry, LiveError, Params};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const EVENT_TEMP_UP: &str = "temp-up";
pub const EVENT_TEMP_DOWN: &str = "temp-down";
pub const EVENT_TEMP_CHANGE: &str = "temp-change";
pub const EVENT_SAVE: &str = "save";

pub const TOPIC_RELOAD: &str = "reload";
pub const TOPIC_STATUS: &str = "status";
pub const TOPIC_TIME: &str = "time";

/// Step of the `temp-up` / `temp-down` buttons.
const TEMPERATURE_STEP: f32 = 0.1;

/// Build the thermostat handler registry.
///
/// # Errors
///
/// Returns `LiveError::Config` if the registry is incomplete.
pub fn thermostat_registry() -> Result<Arc<HandlerRegistry<ThermoModel>>, LiveError> {
    HandlerRegistry::<ThermoModel>::builder()
        .mount(|ctx| {
            let name = ctx.params.string("name");
            info!(
                target: "thermostat.handlers",
                session_id = %ctx.session_id,
                name = %name,
                "Mounting thermostat"
            );
            Ok(ThermoModel::new(name))
        })
        .on_event(EVENT_TEMP_UP, |_, model, _| {
            Ok(model.adjusted(TEMPERATURE_STEP))
        })
        .on_event(EVENT_TEMP_DOWN, |_, model, _| {
            Ok(model.adjusted(-TEMPERATURE_STEP))
        })
        .on_event(EVENT_TEMP_CHANGE, |ctx, model, params| {
            let next = model.adjusted(temperature_delta(params));
            ctx.broadcast(
                TOPIC_STATUS,
                format!(
                    "{}: temperature change from {:.1} to {:.1}",
                    model.name, model.temperature, next.temperature
                ),
            );
            Ok(next)
        })
        .on_event(EVENT_SAVE, |ctx, model, params| {
            let message = params.string("message");
            ctx.broadcast(TOPIC_STATUS, format!("{}: {message}", model.name));
            Ok(model.clone())
        })
        .on_self(TOPIC_RELOAD, |_, model, _| {
            let mut next = model.clone();
            next.live_reload.revision += 1;
            Ok(next)
        })
        .on_self(TOPIC_STATUS, |_, model, payload| {
            Ok(ThermoModel {
                status: text_payload(TOPIC_STATUS, payload)?,
                ..model.clone()
            })
        })
        .on_self(TOPIC_TIME, |_, model, payload| {
            Ok(ThermoModel {
                time: text_payload(TOPIC_TIME, payload)?,
                ..model.clone()
            })
        })
        .build()
}

/// `temperature` param of `temp-change`; a missing or malformed value is 0.
#[allow(clippy::cast_possible_truncation)]
fn temperature_delta(params: &Params) -> f32 {
    params.float("temperature") as f32
}

fn text_payload(topic: &str, payload: &Value) -> Result<String, HandlerError> {
    payload
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| HandlerError::InvalidPayload {
            topic: topic.to_string(),
        })
}
