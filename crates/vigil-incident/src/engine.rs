use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, trace, warn};
use uuid::Uuid;
use vigil_config::IncidentSettings;
use vigil_domain::{
    Incident, IncidentEvent, IncidentEventType, IncidentStatus, ProbeResult, Severity, TenantId,
};
use vigil_queue::{EventBus, EventEnvelope};
use vigil_store::{IncidentFilter, IncidentRepository, IncidentStats, StoreError};

use crate::classify::classify;
use crate::error::IncidentError;
use crate::escalation;
use crate::fingerprint::error_hash;

/// Incident correlation engine.
///
/// A stateless reducer over the incident repository: every probe result
/// drives at most one transition per affected incident and publishes the
/// matching lifecycle event. Transitions for one check are serialized through
/// a per-check critical section so events come out in commit order.
pub struct IncidentEngine {
    settings: IncidentSettings,
    incidents: Arc<dyn IncidentRepository>,
    bus: Arc<dyn EventBus>,
    sections: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IncidentEngine {
    pub fn new(
        settings: IncidentSettings,
        incidents: Arc<dyn IncidentRepository>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        IncidentEngine {
            settings,
            incidents,
            bus,
            sections: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one probe result and drive the state machine.
    ///
    /// Returns the lifecycle events that were committed and published.
    /// Repository failures propagate so the upstream consumer can redeliver;
    /// bus failures do not, the committed state stands.
    pub async fn process(&self, result: &ProbeResult) -> Result<Vec<IncidentEvent>, IncidentError> {
        result.validate()?;
        let _section = self.section(result.check_id.as_str()).await;

        if result.is_success {
            self.handle_success(result).await
        } else {
            self.handle_failure(result).await
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Incident, IncidentError> {
        self.incidents
            .get_by_id(id)
            .await?
            .ok_or(IncidentError::NotFound(id))
    }

    pub async fn list(
        &self,
        tenant: &TenantId,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, IncidentError> {
        Ok(self.incidents.get_by_tenant(tenant, filter).await?)
    }

    pub async fn stats(&self, tenant: &TenantId) -> Result<IncidentStats, IncidentError> {
        Ok(self.incidents.stats(tenant).await?)
    }

    /// Operator acknowledgement: open incidents move to acknowledged.
    /// Acknowledging twice is a no-op; a resolved incident cannot be
    /// acknowledged.
    pub async fn acknowledge(&self, id: Uuid) -> Result<Incident, IncidentError> {
        let check_key = self.get(id).await?.check_id;
        let _section = self.section(check_key.as_str()).await;

        let mut incident = self.get(id).await?;
        match incident.status {
            IncidentStatus::Resolved => Err(IncidentError::AlreadyResolved(id)),
            IncidentStatus::Acknowledged => Ok(incident),
            IncidentStatus::Open => {
                let old_status = incident.status;
                incident.acknowledge();
                self.incidents.update(&incident).await?;
                let event = build_event(
                    &incident,
                    IncidentEventType::Updated,
                    Some(old_status),
                    Some(incident.severity),
                    "incident acknowledged".to_string(),
                    Utc::now(),
                );
                self.commit(event, &incident, None).await;
                Ok(incident)
            }
        }
    }

    /// Operator resolution. Idempotent: resolving a resolved incident emits
    /// nothing.
    pub async fn resolve(&self, id: Uuid) -> Result<Incident, IncidentError> {
        let check_key = self.get(id).await?.check_id;
        let _section = self.section(check_key.as_str()).await;

        let mut incident = self.get(id).await?;
        if incident.is_resolved() {
            return Ok(incident);
        }
        let old_status = incident.status;
        incident.resolve(Utc::now());
        self.incidents.update(&incident).await?;
        let event = build_event(
            &incident,
            IncidentEventType::Resolved,
            Some(old_status),
            Some(incident.severity),
            "incident resolved by operator".to_string(),
            Utc::now(),
        );
        self.commit(event, &incident, None).await;
        Ok(incident)
    }

    async fn handle_success(&self, result: &ProbeResult) -> Result<Vec<IncidentEvent>, IncidentError> {
        let active = self.incidents.get_active_by_check(&result.check_id).await?;
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let now = result.timestamp;
        let window = chrono::Duration::from_std(self.settings.auto_resolve_timeout())
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 4));
        let mut events = Vec::new();

        for mut incident in active {
            // Debounce: one good probe against a recently failing target is
            // not recovery yet.
            if now.signed_duration_since(incident.last_seen) < window {
                trace!(incident_id = %incident.id, "success within debounce window, keeping incident open");
                continue;
            }
            let old_status = incident.status;
            incident.resolve(now);
            self.incidents.update(&incident).await?;
            let event = build_event(
                &incident,
                IncidentEventType::Resolved,
                Some(old_status),
                Some(incident.severity),
                "resolved after sustained success".to_string(),
                now,
            );
            events.push(self.commit(event, &incident, Some(result)).await);
        }
        Ok(events)
    }

    async fn handle_failure(&self, result: &ProbeResult) -> Result<Vec<IncidentEvent>, IncidentError> {
        let now = result.timestamp;
        let message = result.message().to_string();
        let hash = error_hash(&message);
        let severity = classify(&message, result.duration_ms);

        // Exact (check, fingerprint) match: repeat or reopen.
        if let Some(incident) = self
            .incidents
            .get_by_check_and_error_hash(&result.check_id, &hash)
            .await?
        {
            let event = self.apply_repeat(incident, result, &message, severity).await?;
            return Ok(vec![event]);
        }

        // No exact match: attach to the freshest active incident for the
        // check, if any.
        let active = self.incidents.get_active_by_check(&result.check_id).await?;
        if let Some(incident) = active.into_iter().next() {
            let event = self.apply_grouped(incident, result, &message).await?;
            return Ok(vec![event]);
        }

        // First failure of this stream: open.
        let incident = Incident::open(
            result.tenant_id.clone(),
            result.check_id.clone(),
            severity,
            &message,
            &hash,
            now,
        );
        match self.incidents.create(&incident).await {
            Ok(()) => {
                debug!(incident_id = %incident.id, check_id = %incident.check_id, severity = %incident.severity, "incident opened");
                let event = build_event(
                    &incident,
                    IncidentEventType::Opened,
                    None,
                    None,
                    format!("incident opened: {}", incident.error_message),
                    now,
                );
                Ok(vec![self.commit(event, &incident, Some(result)).await])
            }
            Err(StoreError::Conflict(_)) => {
                // A concurrent writer opened the row first: fold this failure
                // into it as a read-modify-write.
                debug!(check_id = %result.check_id, error_hash = %hash, "incident create lost a race, retrying as update");
                match self
                    .incidents
                    .get_by_check_and_error_hash(&result.check_id, &hash)
                    .await?
                {
                    Some(existing) => {
                        let event = self.apply_repeat(existing, result, &message, severity).await?;
                        Ok(vec![event])
                    }
                    None => Err(StoreError::Conflict(format!(
                        "incident create conflict with no matching row for ({}, {})",
                        result.check_id, hash
                    ))
                    .into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_repeat(
        &self,
        mut incident: Incident,
        result: &ProbeResult,
        message: &str,
        severity: Severity,
    ) -> Result<IncidentEvent, IncidentError> {
        let now = result.timestamp;
        let old_status = incident.status;
        let old_severity = incident.severity;

        let reopened = incident.is_resolved();
        if reopened {
            debug!(incident_id = %incident.id, "matching failure after resolution, reopening");
            incident.reopen(now);
        }
        incident.record_repeat(now, message, severity);
        self.maybe_escalate(&mut incident, now);
        self.incidents.update(&incident).await?;

        let text = if reopened {
            format!("incident reopened by matching failure (count={})", incident.count)
        } else {
            format!("matching failure recorded (count={})", incident.count)
        };
        let event = build_event(
            &incident,
            IncidentEventType::Updated,
            Some(old_status),
            Some(old_severity),
            text,
            now,
        );
        Ok(self.commit(event, &incident, Some(result)).await)
    }

    async fn apply_grouped(
        &self,
        mut incident: Incident,
        result: &ProbeResult,
        message: &str,
    ) -> Result<IncidentEvent, IncidentError> {
        let now = result.timestamp;
        let old_status = incident.status;
        let old_severity = incident.severity;

        incident.record_grouped(now, message);
        self.maybe_escalate(&mut incident, now);
        self.incidents.update(&incident).await?;

        let event = build_event(
            &incident,
            IncidentEventType::Grouped,
            Some(old_status),
            Some(old_severity),
            format!("similar failure grouped: {}", message),
            now,
        );
        Ok(self.commit(event, &incident, Some(result)).await)
    }

    fn maybe_escalate(&self, incident: &mut Incident, now: DateTime<Utc>) {
        if let Some(reason) = escalation::evaluate(incident, now, &self.settings) {
            let entry = escalation::entry(incident, now, reason);
            debug!(
                incident_id = %incident.id,
                from = %entry.from_severity,
                to = %entry.to_severity,
                reason = %reason,
                "escalating incident"
            );
            incident.escalate(entry);
        }
    }

    /// Append to the audit log and publish on the bus, both best-effort: the
    /// repository row is already the source of truth.
    async fn commit(
        &self,
        event: IncidentEvent,
        incident: &Incident,
        result: Option<&ProbeResult>,
    ) -> IncidentEvent {
        if let Err(e) = self.incidents.append_event(&event).await {
            warn!(incident_id = %event.incident_id, error = %e, "failed to append incident event to audit log");
        }
        let envelope = EventEnvelope::new(event.clone(), incident.clone(), result.cloned());
        if let Err(e) = self.bus.publish(&envelope).await {
            warn!(
                incident_id = %event.incident_id,
                routing_key = %envelope.routing_key,
                error = %e,
                "event publish failed, committed state stands"
            );
        }
        event
    }

    async fn section(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let section = {
            let mut map = self.sections.lock().expect("section map poisoned");
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        section.lock_owned().await
    }
}

impl std::fmt::Debug for IncidentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentEngine").finish()
    }
}

fn build_event(
    incident: &Incident,
    event_type: IncidentEventType,
    old_status: Option<IncidentStatus>,
    old_severity: Option<Severity>,
    message: String,
    created_at: DateTime<Utc>,
) -> IncidentEvent {
    let mut metadata = HashMap::new();
    metadata.insert("count".to_string(), json!(incident.count));
    metadata.insert("error_hash".to_string(), json!(incident.error_hash));
    IncidentEvent {
        id: Uuid::new_v4(),
        incident_id: incident.id,
        event_type,
        old_status,
        new_status: incident.status,
        old_severity,
        new_severity: incident.severity,
        message,
        metadata,
        created_at,
    }
}
