//! Live runtime error types.
//!
//! No error in the session layer is fatal to the process. Errors are logged
//! and counted where they occur and never cross an actor boundary as a panic.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Live runtime error type.
///
/// Every variant maps to a bounded `kind()` label used for the
/// `live_session_errors_total` metric.
#[derive(Debug, Error)]
pub enum LiveError {
    /// No handler is registered for the event name or self-message topic.
    #[error("No handler registered for {0}")]
    HandlerNotFound(String),

    /// A handler failed to compute the next snapshot.
    #[error("Handler {event} failed: {source}")]
    HandlerFailure {
        event: String,
        #[source]
        source: HandlerError,
    },

    /// The render collaborator failed.
    #[error("Render failed: {0}")]
    RenderFailure(String),

    /// A message could not be delivered to a full or vanished inbox.
    #[error("Delivery to session {session_id} dropped: {reason}")]
    DeliveryDropped {
        session_id: String,
        reason: DropReason,
    },

    /// Session is not live.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Runtime is draining (graceful shutdown).
    #[error("Runtime is draining")]
    Draining,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a delivery was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The inbox stayed full for the whole send timeout.
    InboxFull,
    /// The receiving session has terminated.
    SessionGone,
}

impl DropReason {
    /// Returns the reason as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropReason::InboxFull => "inbox_full",
            DropReason::SessionGone => "session_gone",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by application handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An event parameter was missing or malformed.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    /// A self-message payload had an unexpected shape.
    #[error("Invalid payload for topic {topic}")]
    InvalidPayload { topic: String },

    /// The handler refused the event.
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl LiveError {
    /// Returns a bounded label for this error, used in metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            LiveError::HandlerNotFound(_) => "handler_not_found",
            LiveError::HandlerFailure { .. } => "handler_failure",
            LiveError::RenderFailure(_) => "render_failure",
            LiveError::DeliveryDropped { .. } => "delivery_dropped",
            LiveError::SessionNotFound(_) => "session_not_found",
            LiveError::Draining => "draining",
            LiveError::Config(_) => "config",
            LiveError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            LiveError::HandlerNotFound(_) => "Unknown event".to_string(),
            LiveError::HandlerFailure { .. } => "The event could not be applied".to_string(),
            LiveError::SessionNotFound(_) => "Session expired, please reload".to_string(),
            LiveError::Draining => "Server is shutting down, please reconnect".to_string(),
            LiveError::RenderFailure(_)
            | LiveError::DeliveryDropped { .. }
            | LiveError::Config(_)
            | LiveError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(
            LiveError::HandlerNotFound("temp-up".to_string()).kind(),
            "handler_not_found"
        );
        assert_eq!(
            LiveError::HandlerFailure {
                event: "save".to_string(),
                source: HandlerError::Rejected("nope".to_string()),
            }
            .kind(),
            "handler_failure"
        );
        assert_eq!(
            LiveError::RenderFailure("template".to_string()).kind(),
            "render_failure"
        );
        assert_eq!(
            LiveError::DeliveryDropped {
                session_id: "s-1".to_string(),
                reason: DropReason::InboxFull,
            }
            .kind(),
            "delivery_dropped"
        );
        assert_eq!(LiveError::Draining.kind(), "draining");
        assert_eq!(LiveError::Internal("x".to_string()).kind(), "internal");
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let render_err = LiveError::RenderFailure("missing field `temperature`".to_string());
        assert!(!render_err.client_message().contains("temperature"));
        assert_eq!(render_err.client_message(), "An internal error occurred");

        let handler_err = LiveError::HandlerFailure {
            event: "temp-change".to_string(),
            source: HandlerError::InvalidParam {
                name: "temperature".to_string(),
                reason: "not a number".to_string(),
            },
        };
        assert!(!handler_err.client_message().contains("temperature"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                LiveError::DeliveryDropped {
                    session_id: "s-42".to_string(),
                    reason: DropReason::SessionGone,
                }
            ),
            "Delivery to session s-42 dropped: session_gone"
        );

        assert_eq!(
            format!(
                "{}",
                LiveError::HandlerFailure {
                    event: "save".to_string(),
                    source: HandlerError::InvalidPayload {
                        topic: "status".to_string()
                    },
                }
            ),
            "Handler save failed: Invalid payload for topic status"
        );
    }
}
