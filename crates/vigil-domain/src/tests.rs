#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::incident::*;
    use crate::types::*;

    fn check(id: &str) -> Check {
        Check {
            id: CheckId::new(id),
            tenant_id: TenantId::new("t1"),
            name: id.to_string(),
            target: "example.com:443".to_string(),
            check_type: "tcp".to_string(),
            interval_seconds: 60,
            timeout_seconds: 5,
            priority: Priority::Normal,
            config: Default::default(),
            status: CheckStatus::Active,
            last_run_at: None,
            next_run_at: None,
        }
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn severity_escalation_is_one_step_with_fixed_point() {
        assert_eq!(Severity::Warning.escalated(), Severity::Error);
        assert_eq!(Severity::Error.escalated(), Severity::Critical);
        assert_eq!(Severity::Critical.escalated(), Severity::Critical);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn check_validate_rejects_zero_interval() {
        let mut c = check("c1");
        c.interval_seconds = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn probe_result_validate_rejects_negative_duration() {
        let r = ProbeResult {
            check_id: CheckId::new("c1"),
            tenant_id: TenantId::new("t1"),
            is_success: false,
            error_message: Some("boom".into()),
            duration_ms: -1,
            timestamp: Utc::now(),
        };
        assert!(r.validate().is_err());
    }

    #[test]
    fn probe_result_validate_rejects_empty_ids() {
        let r = ProbeResult {
            check_id: CheckId::new(""),
            tenant_id: TenantId::new("t1"),
            is_success: true,
            error_message: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        };
        assert!(r.validate().is_err());
    }

    #[test]
    fn task_for_check_copies_tenant_and_priority() {
        let c = check("c1");
        let now = Utc::now();
        let t = Task::for_check(&c, now);
        assert_eq!(t.check_id, c.id);
        assert_eq!(t.tenant_id, c.tenant_id);
        assert_eq!(t.priority, c.priority);
        assert_eq!(t.scheduled_at, now);
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn fresh_task_ids_per_firing() {
        let c = check("c1");
        let now = Utc::now();
        assert_ne!(Task::for_check(&c, now).id, Task::for_check(&c, now).id);
    }

    #[test]
    fn lease_liveness_follows_expiry() {
        let now = Utc::now();
        let lease = Lease {
            key: "c1".into(),
            owner: "w1".into(),
            locked_at: now,
            expires_at: now + Duration::seconds(30),
        };
        assert!(lease.is_live(now));
        assert!(!lease.is_live(now + Duration::seconds(31)));
    }

    #[test]
    fn incident_repeat_keeps_invariants() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Warning,
            "boom",
            "abc",
            now,
        );
        inc.record_repeat(now + Duration::seconds(5), "boom again", Severity::Error);
        assert_eq!(inc.count, 2);
        assert_eq!(inc.severity, Severity::Error);
        assert!(inc.first_seen <= inc.last_seen);

        // Lower severity must not de-escalate.
        inc.record_repeat(now + Duration::seconds(10), "boom", Severity::Warning);
        assert_eq!(inc.severity, Severity::Error);
    }

    #[test]
    fn incident_grouping_appends_messages() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Error,
            "connection refused",
            "abc",
            now,
        );
        inc.record_grouped(now + Duration::seconds(1), "connection pool exhausted");
        assert_eq!(inc.count, 2);
        assert_eq!(inc.error_message, "connection refused");
        assert_eq!(inc.grouped_errors(), vec!["connection pool exhausted"]);
    }

    #[test]
    fn incident_resolve_touches_only_status_and_last_seen() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Error,
            "boom",
            "abc",
            now,
        );
        inc.record_repeat(now + Duration::seconds(1), "boom", Severity::Error);
        let count_before = inc.count;
        inc.resolve(now + Duration::seconds(700));
        assert!(inc.is_resolved());
        assert_eq!(inc.count, count_before);
        assert_eq!(inc.error_message, "boom");
    }

    #[test]
    fn incident_reopen_keeps_identity_and_history() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Error,
            "boom",
            "abc",
            now,
        );
        let id = inc.id;
        inc.resolve(now + Duration::seconds(700));
        inc.reopen(now + Duration::seconds(800));
        assert_eq!(inc.id, id);
        assert_eq!(inc.status, IncidentStatus::Open);
        assert_eq!(inc.count, 1);
    }

    #[test]
    fn escalation_entry_lands_in_history() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Error,
            "boom",
            "abc",
            now,
        );
        inc.escalate(EscalationEntry {
            timestamp: now,
            from_severity: Severity::Error,
            to_severity: Severity::Critical,
            incident_duration_seconds: 2700,
            retry_count: 100,
            reason: EscalationReason::HighFrequency,
        });
        assert_eq!(inc.severity, Severity::Critical);
        let history = inc.escalation_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, EscalationReason::HighFrequency);
    }

    #[test]
    fn incident_round_trips_through_json() {
        let now = Utc::now();
        let mut inc = Incident::open(
            TenantId::new("t1"),
            CheckId::new("c1"),
            Severity::Critical,
            "boom",
            "abc",
            now,
        );
        inc.record_grouped(now, "other boom");
        let json = serde_json::to_string(&inc).unwrap();
        let back: Incident = serde_json::from_str(&json).unwrap();
        assert_eq!(inc, back);
    }

    #[test]
    fn event_types_map_to_routing_keys() {
        assert_eq!(IncidentEventType::Opened.routing_key(), "incident.opened");
        assert_eq!(IncidentEventType::Updated.routing_key(), "incident.updated");
        assert_eq!(IncidentEventType::Grouped.routing_key(), "incident.grouped");
        assert_eq!(IncidentEventType::Resolved.routing_key(), "incident.resolved");
    }
}
