//! Server-side publishers of the thermostat: the clock and the one-shot
//! reload.

use crate::handlers::{TOPIC_RELOAD, TOPIC_TIME};
use crate::model::ThermoModel;

use chrono::{DateTime, Utc};
use live_runtime::{BroadcastHub, PeriodicPublisher};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// RFC 1123 timestamp in GMT, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`.
#[must_use]
pub fn format_clock(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Publish the current time on `time` every `interval`.
pub fn spawn_clock(
    hub: BroadcastHub<ThermoModel>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> PeriodicPublisher {
    PeriodicPublisher::spawn_repeating(
        hub,
        TOPIC_TIME,
        interval,
        || Value::String(format_clock(Utc::now())),
        cancel_token,
    )
}

/// Publish `reload` once, `delay` after startup.
pub fn spawn_reload(
    hub: BroadcastHub<ThermoModel>,
    delay: Duration,
    cancel_token: CancellationToken,
) -> PeriodicPublisher {
    PeriodicPublisher::spawn_once(hub, TOPIC_RELOAD, delay, Value::Null, cancel_token)
}
