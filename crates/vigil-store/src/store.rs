use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_domain::{
    Check, CheckId, Incident, IncidentEvent, IncidentStatus, Lease, ProbeResult, Severity, Task,
    TaskStatus, TenantId,
};

use crate::error::StoreError;

#[async_trait]
pub trait CheckRepository: Send + Sync + 'static {
    async fn create(&self, check: &Check) -> Result<(), StoreError>;
    async fn get_by_id(&self, id: &CheckId) -> Result<Option<Check>, StoreError>;
    async fn get_active(&self) -> Result<Vec<Check>, StoreError>;
    async fn get_active_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Check>, StoreError>;
    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Check>, StoreError>;
    async fn update(&self, check: &Check) -> Result<(), StoreError>;
    /// Soft delete: the row stays with status `deleted`.
    async fn delete(&self, id: &CheckId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync + 'static {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<(), StoreError>;
    async fn save_result(&self, id: Uuid, result: &ProbeResult) -> Result<(), StoreError>;
    async fn get_pending(&self, limit: u32) -> Result<Vec<Task>, StoreError>;
}

/// The persisted view of registered firings, used for crash-safe resume.
#[async_trait]
pub trait SchedulerRepository: Send + Sync + 'static {
    async fn add_check(&self, check: &Check) -> Result<(), StoreError>;
    async fn update_check(&self, check: &Check) -> Result<(), StoreError>;
    async fn remove_check(&self, id: &CheckId) -> Result<(), StoreError>;
    async fn get_scheduled(&self) -> Result<Vec<Check>, StoreError>;
}

/// Mutual-exclusion primitive: bounded-TTL named leases with owner identity.
///
/// Acquire is atomic; an expired lease is implicitly free. Release succeeds
/// only for the matching owner.
#[async_trait]
pub trait LeaseRepository: Send + Sync + 'static {
    /// Try to acquire the lease for `key`. Returns `None` when a live lease is
    /// held by someone else.
    async fn try_lock(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>, StoreError>;

    /// Release `key` if held by `owner`. Releasing an absent or expired lease
    /// is a no-op; releasing another owner's live lease is a conflict.
    async fn release(&self, key: &str, owner: &str) -> Result<(), StoreError>;

    async fn is_locked(&self, key: &str) -> Result<bool, StoreError>;
    async fn get(&self, key: &str) -> Result<Option<Lease>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    pub check_id: Option<CheckId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentStats {
    pub total: u64,
    pub open: u64,
    pub acknowledged: u64,
    pub resolved: u64,
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
}

#[async_trait]
pub trait IncidentRepository: Send + Sync + 'static {
    /// Insert a new incident. Fails with [`StoreError::Conflict`] when a
    /// non-resolved incident with the same `(check_id, error_hash)` exists.
    async fn create(&self, incident: &Incident) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Incident>, StoreError>;

    /// Exact-match lookup for deduplication. Prefers the non-resolved row;
    /// falls back to the most recently seen resolved one (the reopen target).
    async fn get_by_check_and_error_hash(
        &self,
        check_id: &CheckId,
        error_hash: &str,
    ) -> Result<Option<Incident>, StoreError>;

    /// Non-resolved incidents for a check, most recently seen first. Drives
    /// similar-by-check grouping and success-driven resolution.
    async fn get_active_by_check(&self, check_id: &CheckId) -> Result<Vec<Incident>, StoreError>;

    async fn get_by_tenant(
        &self,
        tenant: &TenantId,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>, StoreError>;

    async fn update(&self, incident: &Incident) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
    async fn stats(&self, tenant: &TenantId) -> Result<IncidentStats, StoreError>;

    /// Immutable transition audit log.
    async fn append_event(&self, event: &IncidentEvent) -> Result<(), StoreError>;
    async fn list_events(
        &self,
        incident_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<IncidentEvent>, StoreError>;
}

/// Lease TTL for one probe-execution budget: a multiple of the check timeout
/// with a floor of several minutes.
pub fn probe_budget_ttl(timeout: Duration, multiplier: u32, floor: Duration) -> Duration {
    std::cmp::max(timeout * multiplier, floor)
}

/// Convert a `std` duration to a `chrono` one, saturating instead of failing.
pub fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 4))
}

/// Helper for expiry arithmetic used by lease implementations.
pub fn lease_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono_ttl(ttl)
}
