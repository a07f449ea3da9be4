//! Broadcast hub: the registry of live session inboxes.
//!
//! The hub holds weak senders only. It enqueues `self(topic, payload)`
//! messages into session inboxes and never touches a snapshot. A session
//! that has terminated simply fails to upgrade and is pruned.
//!
//! # Overflow policy
//!
//! Every enqueue first tries a non-blocking send. If the inbox is full the
//! producer waits up to the configured send timeout for space, then drops
//! the message and reports `DeliveryDropped`. During a broadcast the waits
//! for full inboxes run concurrently, so one slow subscriber delays the
//! publish by at most one send timeout and never blocks delivery to the
//! others. Session handles use the same policy for client events.
//!
//! Messages a handler queues are flushed from inside its own session loop.
//! That session cannot drain its inbox until the flush returns, so its own
//! copy (the loop-back of a broadcast, or a `send_self`) is tried once and
//! dropped if the inbox is full.

use crate::actors::messages::{Event, SessionMessage};
use crate::actors::metrics::MailboxMonitor;
use crate::errors::{DropReason, LiveError};
use crate::observability::metrics;
use crate::types::SessionId;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Outcome of a single-target delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message is in the session's inbox.
    Delivered,
    /// The message was dropped.
    Dropped(DropReason),
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Inboxes that accepted the message.
    pub delivered: usize,
    /// Inboxes that stayed full for the whole send timeout.
    pub dropped: usize,
    /// Subscribers found terminated and removed.
    pub pruned: usize,
}

struct Subscriber<S> {
    sender: mpsc::WeakSender<SessionMessage<S>>,
    monitor: Arc<MailboxMonitor>,
}

impl<S> Clone for Subscriber<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<S> Subscriber<S> {
    fn is_gone(&self) -> bool {
        self.sender
            .upgrade()
            .map_or(true, |sender| sender.is_closed())
    }
}

struct HubInner<S> {
    subscribers: RwLock<HashMap<SessionId, Subscriber<S>>>,
    send_timeout: Duration,
}

/// Handle to the broadcast hub. Cheap to clone.
pub struct BroadcastHub<S> {
    inner: Arc<HubInner<S>>,
}

impl<S> Clone for BroadcastHub<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for BroadcastHub<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("BroadcastHub")
            .field("subscribers", &subscribers)
            .field("send_timeout", &self.inner.send_timeout)
            .finish()
    }
}

impl<S: Send + 'static> BroadcastHub<S> {
    /// Create an empty hub. `send_timeout` bounds the wait on a full inbox.
    #[must_use]
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                send_timeout,
            }),
        }
    }

    /// Register a session inbox. Replaces any previous inbox for the same
    /// session and returns whether one was replaced.
    pub fn subscribe(
        &self,
        session_id: SessionId,
        inbox: &mpsc::Sender<SessionMessage<S>>,
        monitor: Arc<MailboxMonitor>,
    ) -> bool {
        let subscriber = Subscriber {
            sender: inbox.downgrade(),
            monitor,
        };
        let replaced = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, subscriber)
            .is_some();

        debug!(
            target: "live.hub",
            session_id = %session_id,
            replaced,
            "Session subscribed"
        );
        replaced
    }

    /// Remove a session. Returns whether it was subscribed.
    ///
    /// Once this returns, no publish started afterwards reaches the session.
    pub fn unsubscribe(&self, session_id: &SessionId) -> bool {
        let removed = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();

        if removed {
            debug!(target: "live.hub", session_id = %session_id, "Session unsubscribed");
        }
        removed
    }

    /// Number of registered subscribers (terminated ones included until pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a session is registered.
    #[must_use]
    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    /// The bounded wait applied to full inboxes.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.inner.send_timeout
    }

    /// Deliver `self(topic, payload)` to every subscribed session.
    ///
    /// Iteration order is unspecified. Each live subscriber receives the
    /// message exactly once or has it dropped and reported.
    pub async fn publish(&self, topic: &str, payload: Value) -> PublishReport {
        self.fan_out(topic, payload, None).await
    }

    /// Broadcast on behalf of a session, from inside that session's loop.
    ///
    /// The originating inbox only drains once the caller returns, so a full
    /// origin inbox is dropped at once instead of waiting.
    pub(crate) async fn publish_from(
        &self,
        origin: SessionId,
        topic: &str,
        payload: Value,
    ) -> PublishReport {
        self.fan_out(topic, payload, Some(origin)).await
    }

    #[instrument(skip_all, name = "live.hub.publish", fields(topic = %topic))]
    async fn fan_out(&self, topic: &str, payload: Value, origin: Option<SessionId>) -> PublishReport {
        let targets: Vec<(SessionId, Subscriber<S>)> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut gone = Vec::new();
        let mut slow = JoinSet::new();

        for (session_id, subscriber) in targets {
            let Some(sender) = subscriber.sender.upgrade() else {
                gone.push(session_id);
                continue;
            };
            let message = SessionMessage::Event(Event::self_message(topic, payload.clone()));

            match sender.try_send(message) {
                Ok(()) => {
                    subscriber.monitor.record_enqueue();
                    report.delivered += 1;
                }
                Err(TrySendError::Closed(_)) => gone.push(session_id),
                Err(TrySendError::Full(_)) if origin == Some(session_id) => {
                    subscriber.monitor.record_drop();
                    report_drop(session_id, topic, DropReason::InboxFull);
                    report.dropped += 1;
                }
                Err(TrySendError::Full(message)) => {
                    let send_timeout = self.inner.send_timeout;
                    slow.spawn(async move {
                        let result = sender.send_timeout(message, send_timeout).await;
                        (session_id, subscriber.monitor, result.map_err(drop_reason))
                    });
                }
            }
        }

        while let Some(joined) = slow.join_next().await {
            match joined {
                Ok((_, monitor, Ok(()))) => {
                    monitor.record_enqueue();
                    report.delivered += 1;
                }
                Ok((session_id, _, Err(DropReason::SessionGone))) => gone.push(session_id),
                Ok((session_id, monitor, Err(DropReason::InboxFull))) => {
                    monitor.record_drop();
                    report_drop(session_id, topic, DropReason::InboxFull);
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!(target: "live.hub", error = %e, "Delivery task failed");
                    report.dropped += 1;
                }
            }
        }

        report.pruned = self.prune(&gone);
        metrics::record_broadcast(report.delivered, report.dropped);

        debug!(
            target: "live.hub",
            delivered = report.delivered,
            dropped = report.dropped,
            pruned = report.pruned,
            "Broadcast complete"
        );
        report
    }

    /// Deliver `self(topic, payload)` to one session if it is still live.
    ///
    /// A session that is unknown or gone yields `Dropped(SessionGone)` and
    /// nothing else: no error reaches the caller.
    pub async fn publish_to(&self, session_id: SessionId, topic: &str, payload: Value) -> Delivery {
        self.deliver(session_id, topic, payload, true).await
    }

    /// `send_self` from inside the session's own loop: try once, never wait.
    pub(crate) async fn publish_to_self(
        &self,
        session_id: SessionId,
        topic: &str,
        payload: Value,
    ) -> Delivery {
        self.deliver(session_id, topic, payload, false).await
    }

    #[instrument(skip_all, name = "live.hub.publish_to", fields(session_id = %session_id, topic = %topic))]
    async fn deliver(&self, session_id: SessionId, topic: &str, payload: Value, wait: bool) -> Delivery {
        let subscriber = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned();

        let Some(subscriber) = subscriber else {
            debug!(target: "live.hub", "No live subscriber, message discarded");
            return Delivery::Dropped(DropReason::SessionGone);
        };
        let Some(sender) = subscriber.sender.upgrade() else {
            self.prune(&[session_id]);
            return Delivery::Dropped(DropReason::SessionGone);
        };

        let message = SessionMessage::Event(Event::self_message(topic, payload));
        let send_timeout = if wait {
            self.inner.send_timeout
        } else {
            Duration::ZERO
        };
        match enqueue(&sender, &subscriber.monitor, message, send_timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(DropReason::SessionGone) => {
                self.prune(&[session_id]);
                Delivery::Dropped(DropReason::SessionGone)
            }
            Err(DropReason::InboxFull) => {
                report_drop(session_id, topic, DropReason::InboxFull);
                Delivery::Dropped(DropReason::InboxFull)
            }
        }
    }

    /// Remove subscribers whose inbox is closed. A session that re-subscribed
    /// with a fresh inbox in the meantime is kept.
    fn prune(&self, candidates: &[SessionId]) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut pruned = 0;
        for session_id in candidates {
            if subscribers.get(session_id).is_some_and(Subscriber::is_gone) {
                subscribers.remove(session_id);
                pruned += 1;
                debug!(target: "live.hub", session_id = %session_id, "Pruned terminated subscriber");
            }
        }
        pruned
    }
}

/// Enqueue a message under the overflow policy: try, then wait up to
/// `send_timeout`, then drop.
pub(crate) async fn enqueue<S>(
    sender: &mpsc::Sender<SessionMessage<S>>,
    monitor: &MailboxMonitor,
    message: SessionMessage<S>,
    send_timeout: Duration,
) -> Result<(), DropReason> {
    let result = match sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Closed(_)) => Err(DropReason::SessionGone),
        Err(TrySendError::Full(_)) if send_timeout.is_zero() => Err(DropReason::InboxFull),
        Err(TrySendError::Full(message)) => sender
            .send_timeout(message, send_timeout)
            .await
            .map_err(drop_reason),
    };

    match result {
        Ok(()) => monitor.record_enqueue(),
        Err(DropReason::InboxFull) => monitor.record_drop(),
        Err(DropReason::SessionGone) => {}
    }
    result
}

fn drop_reason<T>(err: SendTimeoutError<T>) -> DropReason {
    match err {
        SendTimeoutError::Timeout(_) => DropReason::InboxFull,
        SendTimeoutError::Closed(_) => DropReason::SessionGone,
    }
}

fn report_drop(session_id: SessionId, topic: &str, reason: DropReason) {
    let err = LiveError::DeliveryDropped {
        session_id: session_id.to_string(),
        reason,
    };
    warn!(
        target: "live.hub",
        session_id = %session_id,
        topic = %topic,
        error = %err,
        "Broadcast delivery dropped"
    );
    metrics::record_delivery_dropped(reason.as_str());
}
