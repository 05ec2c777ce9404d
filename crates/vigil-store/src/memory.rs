use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use vigil_domain::{
    Check, CheckId, CheckStatus, Clock, Incident, IncidentEvent, IncidentStatus, Lease,
    ProbeResult, Severity, SystemClock, Task, TaskStatus, TenantId,
};

use crate::error::StoreError;
use crate::store::{
    lease_expiry, CheckRepository, IncidentFilter, IncidentRepository, IncidentStats,
    LeaseRepository, SchedulerRepository, TaskRepository,
};

#[derive(Debug, Default)]
struct Inner {
    checks: HashMap<CheckId, Check>,
    tasks: HashMap<Uuid, Task>,
    results: HashMap<Uuid, ProbeResult>,
    scheduled: HashMap<CheckId, Check>,
    incidents: HashMap<Uuid, Incident>,
    events: Vec<IncidentEvent>,
}

/// In-memory implementation of the check, task, scheduler, and incident
/// repositories.
///
/// All data is lost on process exit. Suitable for tests and single-process
/// operation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckRepository for InMemoryStore {
    async fn create(&self, check: &Check) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.checks.contains_key(&check.id) {
            return Err(StoreError::Conflict(format!(
                "check already exists: {}",
                check.id
            )));
        }
        guard.checks.insert(check.id.clone(), check.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &CheckId) -> Result<Option<Check>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.checks.get(id).cloned())
    }

    async fn get_active(&self) -> Result<Vec<Check>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .checks
            .values()
            .filter(|c| c.status == CheckStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_active_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Check>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .checks
            .values()
            .filter(|c| c.status == CheckStatus::Active && &c.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Check>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .checks
            .values()
            .filter(|c| &c.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn update(&self, check: &Check) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.checks.contains_key(&check.id) {
            return Err(StoreError::NotFound(format!("check: {}", check.id)));
        }
        guard.checks.insert(check.id.clone(), check.clone());
        Ok(())
    }

    async fn delete(&self, id: &CheckId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        match guard.checks.get_mut(id) {
            Some(check) => {
                check.status = CheckStatus::Deleted;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("check: {}", id))),
        }
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.tasks.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        match guard.tasks.get_mut(&id) {
            Some(task) => {
                task.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("task: {}", id))),
        }
    }

    async fn save_result(&self, id: Uuid, result: &ProbeResult) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.tasks.contains_key(&id) {
            return Err(StoreError::NotFound(format!("task: {}", id)));
        }
        guard.results.insert(id, result.clone());
        Ok(())
    }

    async fn get_pending(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let guard = self.inner.read().await;
        let mut pending: Vec<Task> = guard
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.scheduled_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }
}

#[async_trait]
impl SchedulerRepository for InMemoryStore {
    async fn add_check(&self, check: &Check) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.scheduled.insert(check.id.clone(), check.clone());
        Ok(())
    }

    async fn update_check(&self, check: &Check) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.scheduled.insert(check.id.clone(), check.clone());
        Ok(())
    }

    async fn remove_check(&self, id: &CheckId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.scheduled.remove(id);
        Ok(())
    }

    async fn get_scheduled(&self) -> Result<Vec<Check>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.scheduled.values().cloned().collect())
    }
}

#[async_trait]
impl IncidentRepository for InMemoryStore {
    async fn create(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let duplicate = guard.incidents.values().any(|i| {
            !i.is_resolved()
                && i.check_id == incident.check_id
                && i.error_hash == incident.error_hash
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "non-resolved incident exists for ({}, {})",
                incident.check_id, incident.error_hash
            )));
        }
        guard.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.incidents.get(&id).cloned())
    }

    async fn get_by_check_and_error_hash(
        &self,
        check_id: &CheckId,
        error_hash: &str,
    ) -> Result<Option<Incident>, StoreError> {
        let guard = self.inner.read().await;
        let matching = guard
            .incidents
            .values()
            .filter(|i| &i.check_id == check_id && i.error_hash == error_hash);

        let mut resolved_fallback: Option<&Incident> = None;
        for inc in matching {
            if !inc.is_resolved() {
                return Ok(Some(inc.clone()));
            }
            if resolved_fallback.map_or(true, |prev| inc.last_seen > prev.last_seen) {
                resolved_fallback = Some(inc);
            }
        }
        Ok(resolved_fallback.cloned())
    }

    async fn get_active_by_check(&self, check_id: &CheckId) -> Result<Vec<Incident>, StoreError> {
        let guard = self.inner.read().await;
        let mut active: Vec<Incident> = guard
            .incidents
            .values()
            .filter(|i| &i.check_id == check_id && !i.is_resolved())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(active)
    }

    async fn get_by_tenant(
        &self,
        tenant: &TenantId,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, StoreError> {
        let guard = self.inner.read().await;
        let mut matching: Vec<Incident> = guard
            .incidents
            .values()
            .filter(|i| &i.tenant_id == tenant)
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.severity.map_or(true, |s| i.severity == s))
            .filter(|i| filter.check_id.as_ref().map_or(true, |c| &i.check_id == c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        if let Some(limit) = filter.limit {
            matching.truncate(limit as usize);
        }
        Ok(matching)
    }

    async fn update(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.incidents.contains_key(&incident.id) {
            return Err(StoreError::NotFound(format!("incident: {}", incident.id)));
        }
        guard.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.incidents.remove(&id);
        Ok(())
    }

    async fn stats(&self, tenant: &TenantId) -> Result<IncidentStats, StoreError> {
        let guard = self.inner.read().await;
        let mut stats = IncidentStats::default();
        for inc in guard.incidents.values().filter(|i| &i.tenant_id == tenant) {
            stats.total += 1;
            match inc.status {
                IncidentStatus::Open => stats.open += 1,
                IncidentStatus::Acknowledged => stats.acknowledged += 1,
                IncidentStatus::Resolved => stats.resolved += 1,
            }
            match inc.severity {
                Severity::Warning => stats.warning += 1,
                Severity::Error => stats.error += 1,
                Severity::Critical => stats.critical += 1,
            }
        }
        Ok(stats)
    }

    async fn append_event(&self, event: &IncidentEvent) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.events.push(event.clone());
        Ok(())
    }

    async fn list_events(
        &self,
        incident_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<IncidentEvent>, StoreError> {
        let guard = self.inner.read().await;
        let filtered: Vec<IncidentEvent> = guard
            .events
            .iter()
            .filter(|ev| incident_id.map_or(true, |id| ev.incident_id == id))
            .cloned()
            .collect();
        let start = filtered.len().saturating_sub(limit as usize);
        Ok(filtered[start..].to_vec())
    }
}

/// In-memory implementation of [`LeaseRepository`].
///
/// The whole acquire runs under one write guard, which gives the atomic
/// compare-and-set the contract requires.
#[derive(Clone)]
pub struct InMemoryLeaseStore {
    inner: Arc<RwLock<HashMap<String, Lease>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryLeaseStore {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

impl std::fmt::Debug for InMemoryLeaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLeaseStore").finish()
    }
}

#[async_trait]
impl LeaseRepository for InMemoryLeaseStore {
    async fn try_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>, StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get(key) {
            // A live lease blocks everyone but its owner, who may renew.
            if existing.is_live(now) && existing.owner != owner {
                return Ok(None);
            }
        }
        let lease = Lease {
            key: key.to_string(),
            owner: owner.to_string(),
            locked_at: now,
            expires_at: lease_expiry(now, ttl),
        };
        guard.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.write().await;
        match guard.get(key) {
            None => Ok(()),
            Some(lease) if lease.owner == owner => {
                guard.remove(key);
                Ok(())
            }
            Some(lease) if !lease.is_live(now) => {
                guard.remove(key);
                Ok(())
            }
            Some(lease) => Err(StoreError::Conflict(format!(
                "lease '{}' held by {}",
                key, lease.owner
            ))),
        }
    }

    async fn is_locked(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let guard = self.inner.read().await;
        Ok(guard.get(key).map_or(false, |l| l.is_live(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<Lease>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_domain::{Priority, Severity};

    fn dummy_check(id: &str) -> Check {
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

    fn dummy_incident(check: &str, hash: &str) -> Incident {
        Incident::open(
            TenantId::new("t1"),
            CheckId::new(check),
            Severity::Error,
            "boom",
            hash,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_and_get_check() {
        let store = InMemoryStore::new();
        CheckRepository::create(&store, &dummy_check("c1")).await.unwrap();

        let got = CheckRepository::get_by_id(&store, &CheckId::new("c1"))
            .await
            .unwrap();
        assert_eq!(got.unwrap().id.as_str(), "c1");
    }

    #[tokio::test]
    async fn get_active_skips_paused_and_deleted() {
        let store = InMemoryStore::new();
        CheckRepository::create(&store, &dummy_check("a")).await.unwrap();
        let mut paused = dummy_check("b");
        paused.status = CheckStatus::Paused;
        CheckRepository::create(&store, &paused).await.unwrap();
        CheckRepository::create(&store, &dummy_check("c")).await.unwrap();
        CheckRepository::delete(&store, &CheckId::new("c")).await.unwrap();

        let active = store.get_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn tenant_scoped_listings() {
        let store = InMemoryStore::new();
        CheckRepository::create(&store, &dummy_check("a")).await.unwrap();
        let mut other_tenant = dummy_check("b");
        other_tenant.tenant_id = TenantId::new("t2");
        CheckRepository::create(&store, &other_tenant).await.unwrap();
        let mut paused = dummy_check("c");
        paused.status = CheckStatus::Paused;
        CheckRepository::create(&store, &paused).await.unwrap();

        let t1 = TenantId::new("t1");
        assert_eq!(store.list_by_tenant(&t1).await.unwrap().len(), 2);
        let active_t1 = store.get_active_by_tenant(&t1).await.unwrap();
        assert_eq!(active_t1.len(), 1);
        assert_eq!(active_t1[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn delete_is_soft() {
        let store = InMemoryStore::new();
        CheckRepository::create(&store, &dummy_check("c1")).await.unwrap();
        CheckRepository::delete(&store, &CheckId::new("c1")).await.unwrap();

        let got = CheckRepository::get_by_id(&store, &CheckId::new("c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.status, CheckStatus::Deleted);
    }

    #[tokio::test]
    async fn pending_tasks_ordered_and_limited() {
        let store = InMemoryStore::new();
        let check = dummy_check("c1");
        let base = Utc::now();
        for i in 0..5 {
            let mut t = Task::for_check(&check, base + chrono::Duration::seconds(i));
            if i == 0 {
                t.status = TaskStatus::Succeeded;
            }
            store.create_task(&t).await.unwrap();
        }

        let pending = store.get_pending(3).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|w| w[0].scheduled_at <= w[1].scheduled_at));
    }

    #[tokio::test]
    async fn scheduler_view_round_trips() {
        let store = InMemoryStore::new();
        let mut check = dummy_check("c1");
        store.add_check(&check).await.unwrap();

        check.next_run_at = Some(Utc::now());
        store.update_check(&check).await.unwrap();

        let scheduled = store.get_scheduled().await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled[0].next_run_at.is_some());

        store.remove_check(&check.id).await.unwrap();
        assert!(store.get_scheduled().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incident_create_conflicts_on_live_duplicate() {
        let store = InMemoryStore::new();
        IncidentRepository::create(&store, &dummy_incident("c1", "h1"))
            .await
            .unwrap();

        let err = IncidentRepository::create(&store, &dummy_incident("c1", "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // A different hash for the same check is fine.
        IncidentRepository::create(&store, &dummy_incident("c1", "h2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hash_lookup_prefers_live_then_latest_resolved() {
        let store = InMemoryStore::new();
        let mut resolved = dummy_incident("c1", "h1");
        resolved.resolve(Utc::now());
        IncidentRepository::create(&store, &resolved).await.unwrap();

        let found = store
            .get_by_check_and_error_hash(&CheckId::new("c1"), "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, resolved.id);

        let live = dummy_incident("c1", "h1");
        IncidentRepository::create(&store, &live).await.unwrap();
        let found = store
            .get_by_check_and_error_hash(&CheckId::new("c1"), "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, live.id);
    }

    #[tokio::test]
    async fn stats_count_by_status_and_severity() {
        let store = InMemoryStore::new();
        IncidentRepository::create(&store, &dummy_incident("c1", "h1"))
            .await
            .unwrap();
        let mut crit = dummy_incident("c2", "h2");
        crit.severity = Severity::Critical;
        crit.resolve(Utc::now());
        IncidentRepository::create(&store, &crit).await.unwrap();

        let stats = store.stats(&TenantId::new("t1")).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.critical, 1);

        IncidentRepository::delete(&store, crit.id).await.unwrap();
        let stats = store.stats(&TenantId::new("t1")).await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn lease_excludes_second_owner() {
        let store = InMemoryLeaseStore::new();
        let ttl = Duration::from_secs(60);

        let first = store.try_lock("c1", "w1", ttl).await.unwrap();
        assert!(first.is_some());

        let second = store.try_lock("c1", "w2", ttl).await.unwrap();
        assert!(second.is_none());

        // The owner may renew its own lease.
        let renewed = store.try_lock("c1", "w1", ttl).await.unwrap();
        assert!(renewed.is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_implicitly_free() {
        let store = InMemoryLeaseStore::new();
        store
            .try_lock("c1", "w1", Duration::from_millis(0))
            .await
            .unwrap()
            .unwrap();

        let taken = store.try_lock("c1", "w2", Duration::from_secs(60)).await.unwrap();
        assert!(taken.is_some());
        assert_eq!(taken.unwrap().owner, "w2");
    }

    #[tokio::test]
    async fn release_checks_owner() {
        let store = InMemoryLeaseStore::new();
        store
            .try_lock("c1", "w1", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let held = store.get("c1").await.unwrap().unwrap();
        assert_eq!(held.owner, "w1");
        assert!(held.locked_at < held.expires_at);

        let err = store.release("c1", "w2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.release("c1", "w1").await.unwrap();
        assert!(!store.is_locked("c1").await.unwrap());
        assert!(store.get("c1").await.unwrap().is_none());

        // Releasing an absent lease is a no-op.
        store.release("c1", "w1").await.unwrap();
    }

    #[tokio::test]
    async fn events_filtered_by_incident() {
        use vigil_domain::{IncidentEvent, IncidentEventType, IncidentStatus};

        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for incident_id in [a, b] {
            store
                .append_event(&IncidentEvent {
                    id: Uuid::new_v4(),
                    incident_id,
                    event_type: IncidentEventType::Opened,
                    old_status: None,
                    new_status: IncidentStatus::Open,
                    old_severity: None,
                    new_severity: Severity::Error,
                    message: "boom".into(),
                    metadata: Default::default(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_events(None, 100).await.unwrap().len(), 2);
        assert_eq!(store.list_events(Some(a), 100).await.unwrap().len(), 1);
    }
}
