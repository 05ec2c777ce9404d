use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_domain::{Incident, IncidentEvent, ProbeResult};

use crate::error::QueueError;

/// One published lifecycle notification: the transition record, the incident
/// snapshot after the transition, and the probe result that triggered it
/// (absent for administrative transitions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub routing_key: String,
    pub event: IncidentEvent,
    pub incident: Incident,
    pub result: Option<ProbeResult>,
}

impl EventEnvelope {
    pub fn new(event: IncidentEvent, incident: Incident, result: Option<ProbeResult>) -> Self {
        EventEnvelope {
            routing_key: event.event_type.routing_key().to_string(),
            event,
            incident,
            result,
        }
    }
}

/// Durable topic publish for incident lifecycle events.
///
/// Delivery is at-least-once with consumer-side idempotence; publishing is a
/// best-effort notification and never the source of truth.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), QueueError>;
}
