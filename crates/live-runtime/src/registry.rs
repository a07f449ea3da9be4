//! Handler registry.
//!
//! Maps client event names and self-message topics to handler functions.
//! The registry is assembled once with [`HandlerRegistryBuilder`] and shared
//! read-only behind an `Arc`; lookups take no lock.
//!
//! Client events and self-message topics are separate namespaces, so a
//! `status` click and a `status` broadcast can have different handlers.

use crate::actors::messages::Event;
use crate::errors::{HandlerError, LiveError};
use crate::hub::BroadcastHub;
use crate::types::{Params, SessionId};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Mount handler: produces the initial snapshot of a session.
pub type MountFn<S> = dyn Fn(&MountContext) -> Result<S, HandlerError> + Send + Sync;

/// Client event handler: `(ctx, current, params) -> next`.
pub type EventFn<S> =
    dyn Fn(&mut HandlerContext<S>, &S, &Params) -> Result<S, HandlerError> + Send + Sync;

/// Self-message handler: `(ctx, current, payload) -> next`.
pub type SelfFn<S> =
    dyn Fn(&mut HandlerContext<S>, &S, &Value) -> Result<S, HandlerError> + Send + Sync;

/// Input to the mount handler.
#[derive(Debug, Clone)]
pub struct MountContext {
    /// Session being mounted.
    pub session_id: SessionId,
    /// Parameters of the connecting request.
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq)]
enum Outbound {
    Broadcast { topic: String, payload: Value },
    ToSelf { topic: String, payload: Value },
}

/// Side-effect surface handed to event handlers.
///
/// Messages queued here are published only after the handler returns a new
/// snapshot. A failing handler leaves no trace: neither its snapshot nor
/// its broadcasts.
pub struct HandlerContext<S> {
    session_id: SessionId,
    hub: BroadcastHub<S>,
    outbound: Vec<Outbound>,
}

impl<S: Send + 'static> HandlerContext<S> {
    /// Create a context for one dispatch.
    #[must_use]
    pub fn new(session_id: SessionId, hub: BroadcastHub<S>) -> Self {
        Self {
            session_id,
            hub,
            outbound: Vec::new(),
        }
    }

    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The broadcast hub, for handlers that need more than queued sends.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub<S> {
        &self.hub
    }

    /// Queue `self(topic, payload)` for every live session, this one included.
    pub fn broadcast(&mut self, topic: impl Into<String>, payload: impl Into<Value>) {
        self.outbound.push(Outbound::Broadcast {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    /// Queue `self(topic, payload)` for this session only.
    pub fn send_self(&mut self, topic: impl Into<String>, payload: impl Into<Value>) {
        self.outbound.push(Outbound::ToSelf {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    /// Number of queued messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Discard queued messages.
    pub(crate) fn discard(&mut self) {
        self.outbound.clear();
    }

    /// Publish queued messages in the order they were queued.
    pub(crate) async fn flush(&mut self) {
        for outbound in std::mem::take(&mut self.outbound) {
            match outbound {
                Outbound::Broadcast { topic, payload } => {
                    self.hub.publish_from(self.session_id, &topic, payload).await;
                }
                Outbound::ToSelf { topic, payload } => {
                    self.hub
                        .publish_to_self(self.session_id, &topic, payload)
                        .await;
                }
            }
        }
    }
}

/// Immutable table of handlers.
pub struct HandlerRegistry<S> {
    mount: Box<MountFn<S>>,
    events: HashMap<String, Box<EventFn<S>>>,
    self_topics: HashMap<String, Box<SelfFn<S>>>,
}

impl<S> std::fmt::Debug for HandlerRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<_> = self.events.keys().collect();
        events.sort();
        let mut self_topics: Vec<_> = self.self_topics.keys().collect();
        self_topics.sort();
        f.debug_struct("HandlerRegistry")
            .field("events", &events)
            .field("self_topics", &self_topics)
            .finish_non_exhaustive()
    }
}

impl<S: Send + 'static> HandlerRegistry<S> {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder<S> {
        HandlerRegistryBuilder {
            mount: None,
            events: HashMap::new(),
            self_topics: HashMap::new(),
        }
    }

    /// Run the mount handler.
    ///
    /// # Errors
    ///
    /// Returns `HandlerFailure` if the mount handler fails.
    pub fn mount(&self, ctx: &MountContext) -> Result<S, LiveError> {
        (self.mount)(ctx).map_err(|source| LiveError::HandlerFailure {
            event: "mount".to_string(),
            source,
        })
    }

    /// Whether a client event name resolves.
    #[must_use]
    pub fn has_event(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    /// Whether a self-message topic resolves.
    #[must_use]
    pub fn has_self_topic(&self, topic: &str) -> bool {
        self.self_topics.contains_key(topic)
    }

    /// Resolve and run the handler for `event` against `current`.
    ///
    /// # Errors
    ///
    /// `HandlerNotFound` for an unregistered name, `HandlerFailure` when the
    /// handler returns an error. In both cases nothing queued on `ctx`
    /// survives.
    pub fn dispatch(
        &self,
        ctx: &mut HandlerContext<S>,
        event: &Event,
        current: &S,
    ) -> Result<S, LiveError> {
        let result = match event {
            Event::Client { name, params } => {
                let handler = self
                    .events
                    .get(name)
                    .ok_or_else(|| LiveError::HandlerNotFound(format!("event {name}")))?;
                handler(ctx, current, params)
            }
            Event::SelfMessage { topic, payload } => {
                let handler = self
                    .self_topics
                    .get(topic)
                    .ok_or_else(|| LiveError::HandlerNotFound(format!("topic {topic}")))?;
                handler(ctx, current, payload)
            }
        };

        result.map_err(|source| {
            ctx.discard();
            LiveError::HandlerFailure {
                event: event.name().to_string(),
                source,
            }
        })
    }
}

/// Builder for [`HandlerRegistry`].
pub struct HandlerRegistryBuilder<S> {
    mount: Option<Box<MountFn<S>>>,
    events: HashMap<String, Box<EventFn<S>>>,
    self_topics: HashMap<String, Box<SelfFn<S>>>,
}

impl<S: Send + 'static> HandlerRegistryBuilder<S> {
    /// Set the mount handler.
    #[must_use]
    pub fn mount<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MountContext) -> Result<S, HandlerError> + Send + Sync + 'static,
    {
        self.mount = Some(Box::new(handler));
        self
    }

    /// Register a client event handler. A later registration for the same
    /// name replaces the earlier one.
    #[must_use]
    pub fn on_event<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<S>, &S, &Params) -> Result<S, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.events.insert(name.clone(), Box::new(handler)).is_some() {
            warn!(target: "live.registry", event = %name, "Event handler registered twice, keeping the last");
        }
        self
    }

    /// Register a self-message handler. A later registration for the same
    /// topic replaces the earlier one.
    #[must_use]
    pub fn on_self<F>(mut self, topic: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<S>, &S, &Value) -> Result<S, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let topic = topic.into();
        if self.self_topics.insert(topic.clone(), Box::new(handler)).is_some() {
            warn!(target: "live.registry", topic = %topic, "Self handler registered twice, keeping the last");
        }
        self
    }

    /// Freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::Config` if no mount handler was set.
    pub fn build(self) -> Result<Arc<HandlerRegistry<S>>, LiveError> {
        let mount = self
            .mount
            .ok_or_else(|| LiveError::Config("handler registry has no mount handler".to_string()))?;

        Ok(Arc::new(HandlerRegistry {
            mount,
            events: self.events,
            self_topics: self.self_topics,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<HandlerRegistry<i64>> {
        HandlerRegistry::builder()
            .mount(|_| Ok(10))
            .on_event("inc", |_, n, _| Ok(n + 1))
            .on_event("add", |_, n, params| {
                params
                    .try_float("by")
                    .map(|by| n + by as i64)
                    .ok_or_else(|| HandlerError::InvalidParam {
                        name: "by".to_string(),
                        reason: "not a number".to_string(),
                    })
            })
            .on_event("announce", |ctx, n, _| {
                ctx.broadcast("status", "announced");
                Ok(*n)
            })
            .on_event("fail-after-broadcast", |ctx, _, _| {
                ctx.broadcast("status", "should not leak");
                Err(HandlerError::Rejected("nope".to_string()))
            })
            .on_self("set", |_, _, payload| {
                payload.as_i64().ok_or(HandlerError::InvalidPayload {
                    topic: "set".to_string(),
                })
            })
            .build()
            .unwrap()
    }

    fn ctx() -> HandlerContext<i64> {
        HandlerContext::new(SessionId::new(), BroadcastHub::new(Duration::from_millis(10)))
    }

    #[test]
    fn test_build_requires_mount() {
        let result = HandlerRegistry::<i64>::builder()
            .on_event("inc", |_, n, _| Ok(n + 1))
            .build();
        assert!(matches!(result, Err(LiveError::Config(_))));
    }

    #[test]
    fn test_mount() {
        let registry = registry();
        let mount_ctx = MountContext {
            session_id: SessionId::new(),
            params: Params::new(),
        };
        assert_eq!(registry.mount(&mount_ctx).unwrap(), 10);
    }

    #[test]
    fn test_dispatch_client_and_self() {
        let registry = registry();
        let mut ctx = ctx();

        let next = registry
            .dispatch(&mut ctx, &Event::client("inc", Params::new()), &10)
            .unwrap();
        assert_eq!(next, 11);

        let next = registry
            .dispatch(&mut ctx, &Event::self_message("set", json!(42)), &next)
            .unwrap();
        assert_eq!(next, 42);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let registry = registry();
        let mut ctx = ctx();

        assert!(registry.has_event("inc"));
        assert!(!registry.has_self_topic("inc"));

        let result = registry.dispatch(&mut ctx, &Event::self_message("inc", Value::Null), &1);
        assert!(matches!(result, Err(LiveError::HandlerNotFound(_))));
    }

    #[test]
    fn test_unknown_event() {
        let registry = registry();
        let result = registry.dispatch(&mut ctx(), &Event::client("temp-sideways", Params::new()), &1);
        assert!(matches!(result, Err(LiveError::HandlerNotFound(ref n)) if n.contains("temp-sideways")));
    }

    #[test]
    fn test_handler_failure_carries_event_name() {
        let registry = registry();
        let result = registry.dispatch(
            &mut ctx(),
            &Event::client("add", Params::new().with("by", "lots")),
            &1,
        );
        match result {
            Err(LiveError::HandlerFailure { event, source }) => {
                assert_eq!(event, "add");
                assert!(matches!(source, HandlerError::InvalidParam { .. }));
            }
            other => panic!("expected HandlerFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcasts_are_queued_until_success() {
        let registry = registry();
        let mut ctx = ctx();

        registry
            .dispatch(&mut ctx, &Event::client("announce", Params::new()), &1)
            .unwrap();
        assert_eq!(ctx.pending(), 1);

        ctx.discard();
        let _ = registry.dispatch(&mut ctx, &Event::client("fail-after-broadcast", Params::new()), &1);
        assert_eq!(ctx.pending(), 0);
    }

    #[test]
    fn test_duplicate_registration_keeps_last() {
        let registry = HandlerRegistry::builder()
            .mount(|_| Ok(0_i64))
            .on_event("x", |_, _, _| Ok(1))
            .on_event("x", |_, _, _| Ok(2))
            .build()
            .unwrap();
        let next = registry
            .dispatch(&mut ctx(), &Event::client("x", Params::new()), &0)
            .unwrap();
        assert_eq!(next, 2);
    }
}
