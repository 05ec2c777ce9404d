use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckId(pub String);

impl CheckId {
    pub fn new(s: impl Into<String>) -> Self {
        CheckId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Self {
        TenantId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Active,
    Paused,
    Deleted,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Active => write!(f, "active"),
            CheckStatus::Paused => write!(f, "paused"),
            CheckStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Dispatch priority carried from check to task. Ordered low to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Execution state of a dispatched task, owned by workers after emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

// ── Check ─────────────────────────────────────────────────────────────────────

/// A probe definition: what to probe, how often, and with what budget.
///
/// The scheduler mutates `last_run_at`/`next_run_at` on each firing; everything
/// else is owned by the administrative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: CheckId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Probe target, e.g. `example.com:443`. Interpreted by the worker.
    pub target: String,
    /// Probe type (`http`, `tcp`, ...). Opaque to the scheduler.
    #[serde(rename = "type")]
    pub check_type: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub priority: Priority,
    /// Opaque per-check configuration forwarded to the worker.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    pub status: CheckStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Check {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn is_active(&self) -> bool {
        self.status == CheckStatus::Active
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.as_str().is_empty() {
            return Err(DomainError::MissingCheckId);
        }
        if self.tenant_id.as_str().is_empty() {
            return Err(DomainError::MissingTenantId);
        }
        if self.interval_seconds == 0 {
            return Err(DomainError::InvalidInterval(self.id.to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(DomainError::InvalidTimeout(self.id.to_string()));
        }
        Ok(())
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// An intent to execute one probe instance. Created by the scheduler with a
/// fresh id per firing; consumed by workers. The scheduler never mutates a
/// task after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub check_id: CheckId,
    pub tenant_id: TenantId,
    pub scheduled_at: DateTime<Utc>,
    pub priority: Priority,
    pub status: TaskStatus,
}

impl Task {
    /// Build a fresh task for one firing of `check` at `scheduled_at`.
    pub fn for_check(check: &Check, scheduled_at: DateTime<Utc>) -> Self {
        Task {
            id: Uuid::new_v4(),
            check_id: check.id.clone(),
            tenant_id: check.tenant_id.clone(),
            scheduled_at,
            priority: check.priority,
            status: TaskStatus::Pending,
        }
    }
}

// ── Lease ─────────────────────────────────────────────────────────────────────

/// A bounded named lock. At most one live lease exists per key; expiry makes a
/// lease implicitly released without an API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub key: String,
    pub owner: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ── ProbeResult ───────────────────────────────────────────────────────────────

/// One probe execution outcome, as produced by a worker and consumed by the
/// incident engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub check_id: CheckId,
    pub tenant_id: TenantId,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Structural validation. Failures here never advance incident state.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.check_id.as_str().is_empty() {
            return Err(DomainError::MissingCheckId);
        }
        if self.tenant_id.as_str().is_empty() {
            return Err(DomainError::MissingTenantId);
        }
        if self.duration_ms < 0 {
            return Err(DomainError::NegativeDuration(self.duration_ms));
        }
        Ok(())
    }

    /// The failure message, with absence normalized to the empty string.
    pub fn message(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }
}
