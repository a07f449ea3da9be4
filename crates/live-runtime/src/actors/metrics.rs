//! Mailbox monitoring and actor counters.
//!
//! A session inbox is bounded by `LIVE_INBOX_CAPACITY`, so its alert levels
//! are fractions of that capacity: elevated at a quarter full, critical at
//! three quarters. Producers start waiting only once the inbox is full, so a
//! critical log precedes any `DeliveryDropped`.
//!
//! The supervisor channel has a fixed buffer and fixed levels.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Supervisor,
    Session,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Supervisor => "supervisor",
            ActorType::Session => "session",
        }
    }
}

/// Depths at which a mailbox counts as elevated or critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxThresholds {
    /// First depth reported as [`MailboxLevel::Elevated`].
    pub elevated: usize,
    /// First depth reported as [`MailboxLevel::Critical`].
    pub critical: usize,
}

impl MailboxThresholds {
    /// Levels for the supervisor channel.
    pub const SUPERVISOR: Self = Self {
        elevated: 100,
        critical: 500,
    };

    /// Levels for a session inbox of `capacity` slots.
    ///
    /// `critical` is always above `elevated`, so a one-slot inbox only ever
    /// reaches the elevated level.
    #[must_use]
    pub fn for_inbox(capacity: usize) -> Self {
        let elevated = (capacity / 4).max(1);
        let critical = (capacity.saturating_mul(3) / 4).max(elevated + 1);
        Self { elevated, critical }
    }

    #[must_use]
    pub fn level(&self, depth: usize) -> MailboxLevel {
        if depth >= self.critical {
            MailboxLevel::Critical
        } else if depth >= self.elevated {
            MailboxLevel::Elevated
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MailboxLevel {
    Normal = 0,
    Elevated = 1,
    Critical = 2,
}

impl MailboxLevel {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => MailboxLevel::Normal,
            1 => MailboxLevel::Elevated,
            _ => MailboxLevel::Critical,
        }
    }
}

/// Depth and drop accounting for one actor's inbox.
///
/// Shared between the actor (dequeue side) and every producer holding a
/// handle or a hub subscription (enqueue side). Level changes are logged
/// once per transition, not once per message.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    thresholds: MailboxThresholds,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    /// Last level reported, as a `MailboxLevel` discriminant.
    level: AtomicU8,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(
        actor_type: ActorType,
        actor_id: impl Into<String>,
        thresholds: MailboxThresholds,
    ) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            thresholds,
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            level: AtomicU8::new(MailboxLevel::Normal as u8),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Monitor for a session inbox of `capacity` slots.
    #[must_use]
    pub fn for_session(actor_id: impl Into<String>, capacity: usize) -> Self {
        Self::new(
            ActorType::Session,
            actor_id,
            MailboxThresholds::for_inbox(capacity),
        )
    }

    /// Monitor for the supervisor channel.
    #[must_use]
    pub fn for_supervisor() -> Self {
        Self::new(
            ActorType::Supervisor,
            "supervisor",
            MailboxThresholds::SUPERVISOR,
        )
    }

    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        self.observe(depth);
    }

    pub fn record_dequeue(&self) {
        // A message sent before the monitor saw it can be dequeued without
        // a matching enqueue.
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap_or(0);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.observe(previous.saturating_sub(1));
    }

    /// Record a message dropped under the overflow policy.
    pub fn record_drop(&self) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            target: "live.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped,
            "Message dropped, inbox full"
        );
    }

    #[must_use]
    pub fn thresholds(&self) -> MailboxThresholds {
        self.thresholds
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.thresholds.level(self.current_depth())
    }

    /// Log when `depth` moves the mailbox into a different level.
    fn observe(&self, depth: usize) {
        let level = self.thresholds.level(depth);
        let previous = MailboxLevel::from_u8(self.level.swap(level as u8, Ordering::Relaxed));
        if level == previous {
            return;
        }

        match level {
            MailboxLevel::Critical => warn!(
                target: "live.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                threshold = self.thresholds.critical,
                "Mailbox depth critical"
            ),
            MailboxLevel::Elevated if previous < level => debug!(
                target: "live.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                threshold = self.thresholds.elevated,
                "Mailbox depth elevated"
            ),
            _ => debug!(
                target: "live.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                level = ?level,
                "Mailbox draining"
            ),
        }
    }
}

/// Process-wide actor counters, mirrored to the `live_*` gauges.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    pub active_sessions: AtomicUsize,
    pub actor_panics: AtomicU64,
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_created(&self) {
        let count = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        crate::observability::metrics::set_sessions_active(count);
    }

    pub fn session_removed(&self) {
        let count = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(1))
            })
            .map_or(0, |prev| prev.saturating_sub(1));
        crate::observability::metrics::set_sessions_active(count);
    }

    /// A session task ended by panicking. Always a bug in a handler or renderer.
    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        crate::observability::metrics::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "live.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = total,
            "Actor task panicked"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }
}
