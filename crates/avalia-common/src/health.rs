//! Service health reporting.

use serde::{Deserialize, Serialize};

/// Overall condition of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No issues.
    Healthy,
    /// One issue worth surfacing.
    Warning,
    /// Multiple issues.
    Error,
}

/// Result of a service health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregated status.
    pub status: HealthStatus,
    /// Human-readable findings.
    pub issues: Vec<String>,
}

impl HealthReport {
    /// Derive the status from the collected issues: none is healthy, one
    /// is a warning, more is an error.
    pub fn from_issues(issues: Vec<String>) -> Self {
        let status = match issues.len() {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Warning,
            _ => HealthStatus::Error,
        };
        Self { status, issues }
    }
}
