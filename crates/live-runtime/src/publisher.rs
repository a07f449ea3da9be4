//! Periodic publisher.
//!
//! Server-originated event sources. A repeating publisher calls
//! [`BroadcastHub::publish`] once per interval (first tick immediately); a
//! one-shot publisher calls it once after a delay. Neither touches session
//! state: the published message is handled inside each session's own loop.
//!
//! Missed ticks are skipped, not replayed: at most one publish per interval.
//! Intervals below [`MIN_INTERVAL`] are raised to it.

use crate::hub::BroadcastHub;

use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shortest interval a repeating publisher runs at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A running publisher task.
///
/// Dropping the publisher cancels it without waiting; use [`stop`] to wait
/// until the task has exited.
///
/// [`stop`]: PeriodicPublisher::stop
#[derive(Debug)]
pub struct PeriodicPublisher {
    topic: String,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PeriodicPublisher {
    /// Publish `payload()` on `topic` every `interval` until stopped.
    /// A zero interval runs at [`MIN_INTERVAL`].
    ///
    /// `cancel_token` is typically a child of the supervisor's token so the
    /// publisher stops with the process.
    pub fn spawn_repeating<S, F>(
        hub: BroadcastHub<S>,
        topic: impl Into<String>,
        interval: Duration,
        payload: F,
        cancel_token: CancellationToken,
    ) -> Self
    where
        S: Send + 'static,
        F: Fn() -> Value + Send + 'static,
    {
        let topic = topic.into();
        if interval < MIN_INTERVAL {
            warn!(
                target: "live.publisher",
                topic = %topic,
                requested_ms = interval.as_millis(),
                "Publisher interval below minimum, clamped"
            );
        }
        let interval = interval.max(MIN_INTERVAL);
        let task = tokio::spawn(run_repeating(
            hub,
            topic.clone(),
            interval,
            payload,
            cancel_token.clone(),
        ));

        Self {
            topic,
            cancel_token,
            task: Some(task),
        }
    }

    /// Publish `payload` on `topic` once, after `delay`, unless stopped first.
    pub fn spawn_once<S>(
        hub: BroadcastHub<S>,
        topic: impl Into<String>,
        delay: Duration,
        payload: Value,
        cancel_token: CancellationToken,
    ) -> Self
    where
        S: Send + 'static,
    {
        let topic = topic.into();
        let task = tokio::spawn(run_once(
            hub,
            topic.clone(),
            delay,
            payload,
            cancel_token.clone(),
        ));

        Self {
            topic,
            cancel_token,
            task: Some(task),
        }
    }

    /// Topic this publisher publishes on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the task has exited (stopped, or a one-shot that fired).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel the publisher and wait for its task to exit.
    ///
    /// Once this returns no further publish happens.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[instrument(skip_all, name = "live.publisher.repeating", fields(topic = %topic))]
async fn run_repeating<S, F>(
    hub: BroadcastHub<S>,
    topic: String,
    interval: Duration,
    payload: F,
    cancel_token: CancellationToken,
) where
    S: Send + 'static,
    F: Fn() -> Value + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        target: "live.publisher",
        topic = %topic,
        interval_ms = interval.as_millis(),
        "Periodic publisher started"
    );

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => break,

            _ = ticker.tick() => {
                let report = hub.publish(&topic, payload()).await;
                debug!(
                    target: "live.publisher",
                    topic = %topic,
                    delivered = report.delivered,
                    "Tick published"
                );
            }
        }
    }

    info!(target: "live.publisher", topic = %topic, "Periodic publisher stopped");
}

#[instrument(skip_all, name = "live.publisher.once", fields(topic = %topic))]
async fn run_once<S>(
    hub: BroadcastHub<S>,
    topic: String,
    delay: Duration,
    payload: Value,
    cancel_token: CancellationToken,
) where
    S: Send + 'static,
{
    tokio::select! {
        biased;

        () = cancel_token.cancelled() => {
            debug!(target: "live.publisher", topic = %topic, "One-shot publisher cancelled before firing");
        }

        () = tokio::time::sleep(delay) => {
            let report = hub.publish(&topic, payload).await;
            info!(
                target: "live.publisher",
                topic = %topic,
                delivered = report.delivered,
                "One-shot published"
            );
        }
    }
}
