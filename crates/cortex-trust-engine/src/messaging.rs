// crates/cortex-trust-engine/src/messaging.rs
// ============================================================================
// Module: Trust Engine Messaging
// Description: Delivery of human-facing notices (pauses, milestones, reports).
// Purpose: Decouple the engine from any particular chat/notification backend.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`MessageSink`] is the seam between engine components that need to put
//! text in front of a human (a pending confirmation, a milestone, a rendered
//! report) and whatever channel actually carries it (Synapse, a log file, a
//! test double). Implementations must fail closed: a delivery error must
//! never be swallowed into a silent no-op, since a dropped pause notice means
//! nobody reviews a tier-3+ action.

use thiserror::Error;

/// Errors a [`MessageSink`] may report.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Delivery to the underlying channel failed.
    #[error("message delivery failed: {0}")]
    DeliveryFailed(String),
}

/// A classification of the message being sent, so a sink can route or
/// prioritize without parsing body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A tier-3+ action is paused awaiting confirmation.
    PendingConfirmation,
    /// A milestone (promotion, demotion, first auto-approve) occurred.
    Milestone,
    /// An advisory/knowledge payload injected ahead of a tool call.
    Advisory,
    /// A rendered trust report.
    Report,
}

/// A message ready for delivery to an interactive recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub session_id: String,
    pub body: String,
}

/// Delivers outbound messages to whatever channel a deployment wires in.
pub trait MessageSink: Send + Sync {
    /// Delivers `message`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError`] when delivery fails.
    fn deliver(&self, message: &OutboundMessage) -> Result<(), MessagingError>;
}

/// A sink that discards every message it is asked to deliver.
///
/// # Invariants
/// - Intended only for tests and standalone CLI invocations where no
///   interactive recipient exists to notify.
pub struct NullSink;

impl MessageSink for NullSink {
    fn deliver(&self, _message: &OutboundMessage) -> Result<(), MessagingError> {
        Ok(())
    }
}

/// A sink that appends delivered messages to an in-memory log, for tests and
/// for any deployment that just wants an audit trail on disk.
pub struct CollectingSink {
    delivered: std::sync::Mutex<Vec<OutboundMessage>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self { delivered: std::sync::Mutex::new(Vec::new()) }
    }

    /// Returns every message delivered so far, oldest first.
    #[must_use]
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for CollectingSink {
    fn deliver(&self, message: &OutboundMessage) -> Result<(), MessagingError> {
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| MessagingError::DeliveryFailed("collecting sink mutex poisoned".to_string()))?;
        guard.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use super::CollectingSink;
    use super::MessageKind;
    use super::MessageSink;
    use super::NullSink;
    use super::OutboundMessage;

    #[test]
    fn null_sink_always_succeeds() {
        let sink = NullSink;
        let message = OutboundMessage {
            kind: MessageKind::Advisory,
            session_id: "matthew-laptop".to_string(),
            body: "heads up".to_string(),
        };
        assert!(sink.deliver(&message).is_ok());
    }

    #[test]
    fn collecting_sink_records_delivered_messages_in_order() {
        let sink = CollectingSink::new();
        let first = OutboundMessage {
            kind: MessageKind::PendingConfirmation,
            session_id: "matthew-laptop".to_string(),
            body: "confirm deploy?".to_string(),
        };
        let second = OutboundMessage {
            kind: MessageKind::Milestone,
            session_id: "matthew-laptop".to_string(),
            body: "deploy promoted".to_string(),
        };
        sink.deliver(&first).expect("deliver");
        sink.deliver(&second).expect("deliver");
        let delivered = sink.delivered();
        assert_eq!(delivered, vec![first, second]);
    }
}
