use chrono::{DateTime, Utc};
use vigil_config::IncidentSettings;
use vigil_domain::{EscalationEntry, EscalationReason, Incident, Severity};

/// Evaluate the escalation rules for a failure against an existing incident.
///
/// Rules are checked in order and the first match wins:
/// 1. `timeout`: the incident has been open longer than the per-severity
///    escalation timeout.
/// 2. `retry_count`: the failure count exceeds the per-severity cap.
/// 3. `high_frequency`: the incident is old enough for a rate to be
///    meaningful and failures arrive faster than the configured rate.
///
/// Critical incidents are a fixed point and never produce a match.
pub fn evaluate(
    incident: &Incident,
    now: DateTime<Utc>,
    settings: &IncidentSettings,
) -> Option<EscalationReason> {
    if incident.severity == Severity::Critical {
        return None;
    }

    let age = now.signed_duration_since(incident.first_seen);

    let timeout = chrono::Duration::from_std(settings.escalation_timeout.get(incident.severity))
        .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 4));
    if age > timeout {
        return Some(EscalationReason::Timeout);
    }

    if incident.count > settings.max_retries_before_escalation.get(incident.severity) {
        return Some(EscalationReason::RetryCount);
    }

    let min_age = chrono::Duration::from_std(settings.high_frequency_min_age())
        .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 4));
    if age >= min_age {
        let minutes = age.num_seconds() as f64 / 60.0;
        if minutes > 0.0 && incident.count as f64 / minutes > settings.high_frequency_rate_per_min {
            return Some(EscalationReason::HighFrequency);
        }
    }

    None
}

/// Build the history entry for a one-step severity bump.
pub fn entry(incident: &Incident, now: DateTime<Utc>, reason: EscalationReason) -> EscalationEntry {
    EscalationEntry {
        timestamp: now,
        from_severity: incident.severity,
        to_severity: incident.severity.escalated(),
        incident_duration_seconds: now.signed_duration_since(incident.first_seen).num_seconds(),
        retry_count: incident.count,
        reason,
    }
}
