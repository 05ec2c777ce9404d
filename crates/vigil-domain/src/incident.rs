use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{CheckId, TenantId};

/// Metadata key holding the messages attached by similar-by-check grouping.
pub const GROUPED_ERRORS_KEY: &str = "grouped_errors";

/// Metadata key holding the escalation history entries.
pub const ESCALATION_HISTORY_KEY: &str = "escalation_history";

// ── Severity ──────────────────────────────────────────────────────────────────

/// Incident severity, ordered warning < error < critical. While an incident is
/// not resolved, its severity only moves up this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// One escalation step up. Critical is a fixed point.
    pub fn escalated(self) -> Severity {
        match self {
            Severity::Warning => Severity::Error,
            Severity::Error => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "open"),
            IncidentStatus::Acknowledged => write!(f, "acknowledged"),
            IncidentStatus::Resolved => write!(f, "resolved"),
        }
    }
}

// ── Escalation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    Timeout,
    RetryCount,
    HighFrequency,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationReason::Timeout => write!(f, "timeout"),
            EscalationReason::RetryCount => write!(f, "retry_count"),
            EscalationReason::HighFrequency => write!(f, "high_frequency"),
        }
    }
}

/// One entry of `metadata.escalation_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEntry {
    pub timestamp: DateTime<Utc>,
    pub from_severity: Severity,
    pub to_severity: Severity,
    /// Age of the incident at escalation time, in seconds.
    pub incident_duration_seconds: i64,
    pub retry_count: u64,
    pub reason: EscalationReason,
}

// ── Incident ──────────────────────────────────────────────────────────────────

/// A long-lived error aggregate, uniquely identified among non-resolved rows
/// by `(check_id, error_hash)`.
///
/// Invariants upheld by the mutators below:
/// - `first_seen <= last_seen`
/// - `count` is monotone non-decreasing while not resolved
/// - severity never de-escalates while not resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub check_id: CheckId,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u64,
    /// Most recent message of the exact-match failure stream.
    pub error_message: String,
    /// Stable fingerprint of the normalized `error_message`.
    pub error_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Incident {
    pub fn open(
        tenant_id: TenantId,
        check_id: CheckId,
        severity: Severity,
        error_message: impl Into<String>,
        error_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Incident {
            id: Uuid::new_v4(),
            tenant_id,
            check_id,
            severity,
            status: IncidentStatus::Open,
            first_seen: now,
            last_seen: now,
            count: 1,
            error_message: error_message.into(),
            error_hash: error_hash.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == IncidentStatus::Resolved
    }

    /// A repeated exact-match failure: bump the counter, refresh the message,
    /// and raise severity monotonically.
    pub fn record_repeat(&mut self, now: DateTime<Utc>, message: &str, severity: Severity) {
        self.count += 1;
        self.last_seen = now;
        self.error_message = message.to_string();
        if severity > self.severity {
            self.severity = severity;
        }
    }

    /// A structurally similar failure for the same check: attach the message
    /// to `grouped_errors` instead of replacing the primary one.
    pub fn record_grouped(&mut self, now: DateTime<Utc>, message: &str) {
        self.count += 1;
        self.last_seen = now;
        let entry = self
            .metadata
            .entry(GROUPED_ERRORS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = entry {
            arr.push(Value::String(message.to_string()));
        }
    }

    /// Matching failure after resolution: back to open, keeping identity,
    /// counter, and history.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.status = IncidentStatus::Open;
        self.last_seen = now;
    }

    /// Resolution touches only `status` and `last_seen`.
    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.status = IncidentStatus::Resolved;
        self.last_seen = now;
    }

    pub fn acknowledge(&mut self) {
        self.status = IncidentStatus::Acknowledged;
    }

    /// Apply an escalation step and append it to the history.
    pub fn escalate(&mut self, entry: EscalationEntry) {
        self.severity = entry.to_severity;
        let history = self
            .metadata
            .entry(ESCALATION_HISTORY_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = history {
            arr.push(serde_json::to_value(&entry).unwrap_or(Value::Null));
        }
    }

    pub fn grouped_errors(&self) -> Vec<String> {
        match self.metadata.get(GROUPED_ERRORS_KEY) {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn escalation_history(&self) -> Vec<EscalationEntry> {
        match self.metadata.get(ESCALATION_HISTORY_KEY) {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ── IncidentEvent ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentEventType {
    Opened,
    Updated,
    Grouped,
    Resolved,
}

impl IncidentEventType {
    /// Routing key on the event bus.
    pub fn routing_key(&self) -> &'static str {
        match self {
            IncidentEventType::Opened => "incident.opened",
            IncidentEventType::Updated => "incident.updated",
            IncidentEventType::Grouped => "incident.grouped",
            IncidentEventType::Resolved => "incident.resolved",
        }
    }
}

impl std::fmt::Display for IncidentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.routing_key())
    }
}

/// Immutable audit record of one incident transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub event_type: IncidentEventType,
    pub old_status: Option<IncidentStatus>,
    pub new_status: IncidentStatus,
    pub old_severity: Option<Severity>,
    pub new_severity: Severity,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}
