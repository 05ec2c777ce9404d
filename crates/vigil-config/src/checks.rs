use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use vigil_domain::{Check, CheckId, CheckStatus, Priority, TenantId};

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct RawSeedFile {
    #[serde(default)]
    checks: Vec<RawCheck>,
}

#[derive(Debug, Deserialize)]
struct RawCheck {
    id: String,
    tenant: String,
    name: Option<String>,
    target: String,
    #[serde(rename = "type")]
    check_type: String,
    interval_seconds: u64,
    timeout_seconds: u64,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    config: HashMap<String, serde_json::Value>,
}

/// Load a check seed file.
///
/// ```text
/// checks:
///   - id: web-1
///     tenant: acme
///     target: example.com:443
///     type: tcp
///     interval_seconds: 30
///     timeout_seconds: 5
///     priority: high
/// ```
pub fn load_checks(path: &Path) -> Result<Vec<Check>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawSeedFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut checks = Vec::with_capacity(raw.checks.len());
    for raw_check in raw.checks {
        let check = convert_check(raw_check)?;
        check.validate()?;
        debug!(check_id = %check.id, "loaded check from {}", path.display());
        checks.push(check);
    }
    Ok(checks)
}

fn convert_check(raw: RawCheck) -> Result<Check, ConfigError> {
    Ok(Check {
        name: raw.name.unwrap_or_else(|| raw.id.clone()),
        id: CheckId::new(raw.id),
        tenant_id: TenantId::new(raw.tenant),
        target: raw.target,
        check_type: raw.check_type,
        interval_seconds: raw.interval_seconds,
        timeout_seconds: raw.timeout_seconds,
        priority: raw.priority,
        config: raw.config,
        status: CheckStatus::Active,
        last_run_at: None,
        next_run_at: None,
    })
}
