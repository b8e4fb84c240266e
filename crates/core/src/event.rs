//! Events — the per-submission stream protocol and the domain event bus.
//!
//! [`InteractionEvent`] is the ordered stream a caller receives for one
//! submission: `Started` always precedes any `Chunk`; chunks precede exactly
//! one terminal `Committed` or `Fallback`; nothing is emitted for a
//! superseded interaction after supersession is recorded.
//!
//! [`DomainEvent`]s are broadcast for decoupled observers (dashboards,
//! telemetry) and carry no learner-visible text beyond previews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::validation::ValidationAction;

/// Why a submission ended in a fallback response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Validation rejected the draft (or retries were exhausted).
    ValidationRejected,
    /// The generation backend failed after transient retries.
    GenerationFailed,
}

/// Events emitted to the caller over one submission's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    /// The submission was admitted and the pipeline started.
    Started { interaction_id: String, epoch: u64 },

    /// Partial instructor text. Chunks are withheld until the draft passes
    /// validation, so rejected text never reaches the learner.
    Chunk { content: String },

    /// The final validation outcome for this submission.
    Validated {
        action: ValidationAction,
        violations: usize,
    },

    /// The response was committed along with its memory update.
    Committed {
        interaction_id: String,
        result_text: String,
        score: f32,
    },

    /// The canned safe response was served instead.
    Fallback {
        interaction_id: String,
        text: String,
        reason: FallbackReason,
    },
}

impl InteractionEvent {
    /// Stable event name for wire protocols.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Chunk { .. } => "chunk",
            Self::Validated { .. } => "validated",
            Self::Committed { .. } => "committed",
            Self::Fallback { .. } => "fallback",
        }
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An interaction was accepted and committed
    InteractionCommitted {
        session_id: String,
        screen_id: String,
        interaction_id: String,
        epoch: u64,
        timestamp: DateTime<Utc>,
    },

    /// An interaction was superseded and discarded
    InteractionCancelled {
        session_id: String,
        interaction_id: String,
        superseded_by: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An interaction was rejected or its generation failed
    InteractionFailed {
        session_id: String,
        interaction_id: String,
        violations: usize,
        timestamp: DateTime<Utc>,
    },

    /// A screen reached the completed phase
    ScreenCompleted {
        session_id: String,
        screen_id: String,
        mastery_achieved: bool,
        timestamp: DateTime<Utc>,
    },

    /// Learner memory was mutated for a committed interaction
    MemoryApplied {
        learner_id: String,
        interaction_id: String,
        concepts: usize,
        timestamp: DateTime<Utc>,
    },

    /// A hint was served
    HintServed {
        session_id: String,
        screen_id: String,
        level: u8,
        timestamp: DateTime<Utc>,
    },
}

/// Multi-consumer pub/sub for [`DomainEvent`]s.
///
/// The capacity comes from configuration (`events.bus_capacity`); there is
/// deliberately no default, so the orchestrator always sizes the bus from
/// its config. Events are fire-and-forget: the pipeline never blocks on an
/// observer, and a slow subscriber only lags itself.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; returns how many subscribers received it.
    ///
    /// Zero subscribers is not an error — sessions run the same whether or
    /// not anything is observing them.
    pub fn publish(&self, event: DomainEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// How many subscribers are currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_event_serialization() {
        let event = InteractionEvent::Started {
            interaction_id: "i1".into(),
            epoch: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"started""#));
        assert!(json.contains(r#""epoch":3"#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            InteractionEvent::Chunk {
                content: "x".into()
            }
            .event_type(),
            "chunk"
        );
        assert_eq!(
            InteractionEvent::Fallback {
                interaction_id: "i".into(),
                text: "t".into(),
                reason: FallbackReason::ValidationRejected,
            }
            .event_type(),
            "fallback"
        );
    }

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let delivered = bus.publish(DomainEvent::HintServed {
            session_id: "s1".into(),
            screen_id: "scr1".into(),
            level: 2,
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            DomainEvent::HintServed { level, .. } => assert_eq!(level, 2),
            _ => panic!("Expected HintServed event"),
        }
    }

    #[test]
    fn publish_without_subscribers_reports_zero() {
        let bus = EventBus::new(16);
        let delivered = bus.publish(DomainEvent::InteractionFailed {
            session_id: "s".into(),
            interaction_id: "i".into(),
            violations: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
