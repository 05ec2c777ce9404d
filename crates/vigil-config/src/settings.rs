use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use vigil_domain::Severity;

use crate::error::ConfigError;

/// Runtime settings for the scheduler and the incident engine.
///
/// Every field has a default, so a missing or partial settings file is fine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub incident: IncidentSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
                path: path.display().to_string(),
                source: e,
            })?;
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Worker identity used as lease owner. Defaults to a fresh per-process id.
    pub worker_id: Option<String>,
    /// Lower bound on a probe-execution lease, seconds.
    pub lease_ttl_floor_secs: u64,
    /// Lease TTL as a multiple of the check timeout.
    pub lease_ttl_multiplier: u32,
    /// How long `stop()` waits for in-flight firings, seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            worker_id: None,
            lease_ttl_floor_secs: 300,
            lease_ttl_multiplier: 5,
            shutdown_grace_secs: 30,
        }
    }
}

impl SchedulerSettings {
    /// The configured worker id, or a fresh per-process one.
    pub fn worker_id(&self) -> String {
        self.worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()))
    }

    pub fn lease_ttl_floor(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_floor_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// One value per severity level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityTimeouts {
    pub warning_secs: u64,
    pub error_secs: u64,
    pub critical_secs: u64,
}

impl Default for SeverityTimeouts {
    fn default() -> Self {
        SeverityTimeouts {
            warning_secs: 1800,
            error_secs: 900,
            critical_secs: 300,
        }
    }
}

impl SeverityTimeouts {
    pub fn get(&self, severity: Severity) -> Duration {
        let secs = match severity {
            Severity::Warning => self.warning_secs,
            Severity::Error => self.error_secs,
            Severity::Critical => self.critical_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityRetries {
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
}

impl Default for SeverityRetries {
    fn default() -> Self {
        SeverityRetries {
            warning: 10,
            error: 5,
            critical: 2,
        }
    }
}

impl SeverityRetries {
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Warning => self.warning,
            Severity::Error => self.error,
            Severity::Critical => self.critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentSettings {
    /// Debounce window for success-driven resolution, seconds.
    pub auto_resolve_timeout_secs: u64,
    /// Incident age beyond which a failure escalates, per severity.
    pub escalation_timeout: SeverityTimeouts,
    /// Failure count beyond which a failure escalates, per severity.
    pub max_retries_before_escalation: SeverityRetries,
    /// Minimum incident age before the frequency rule applies, seconds.
    pub high_frequency_min_age_secs: u64,
    /// Failures per minute above which the frequency rule fires.
    pub high_frequency_rate_per_min: f64,
}

impl Default for IncidentSettings {
    fn default() -> Self {
        IncidentSettings {
            auto_resolve_timeout_secs: 600,
            escalation_timeout: SeverityTimeouts::default(),
            max_retries_before_escalation: SeverityRetries::default(),
            high_frequency_min_age_secs: 1800,
            high_frequency_rate_per_min: 1.0,
        }
    }
}

impl IncidentSettings {
    pub fn auto_resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_resolve_timeout_secs)
    }

    pub fn high_frequency_min_age(&self) -> Duration {
        Duration::from_secs(self.high_frequency_min_age_secs)
    }
}
