pub mod clock;
pub mod error;
pub mod incident;
pub mod types;

#[cfg(test)]
mod tests;

pub use clock::{Clock, SystemClock};
pub use error::DomainError;
pub use incident::{
    EscalationEntry, EscalationReason, Incident, IncidentEvent, IncidentEventType,
    IncidentStatus, Severity, ESCALATION_HISTORY_KEY, GROUPED_ERRORS_KEY,
};
pub use types::{
    Check, CheckId, CheckStatus, Lease, Priority, ProbeResult, Task, TaskStatus, TenantId,
};
