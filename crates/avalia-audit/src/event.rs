//! Audit Event Model
//!
//! An event is immutable once appended: nothing in this crate mutates or
//! rewrites a persisted event, only retention cleanup removes whole
//! entries by age.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recorded operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    LoginFailed,
    Export,
    Import,
    PermissionChange,
    ConfigChange,
    SystemAccess,
    DataBreachAttempt,
}

impl AuditAction {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::LoginFailed => "login_failed",
            Self::Export => "export",
            Self::Import => "import",
            Self::PermissionChange => "permission_change",
            Self::ConfigChange => "config_change",
            Self::SystemAccess => "system_access",
            Self::DataBreachAttempt => "data_breach_attempt",
        }
    }
}

/// Event weight; `Critical` forces an immediate flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Every severity, in ascending order.
    pub fn all() -> [Self; 4] {
        [Self::Low, Self::Medium, Self::High, Self::Critical]
    }
}

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    DataAccess,
    Configuration,
    Security,
    Compliance,
    System,
}

impl AuditCategory {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::Configuration => "configuration",
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::System => "system",
        }
    }
}

/// Immutable record of a state change or security-relevant action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub tenant_id: String,
    /// Acting user, or `"anonymous"`
    pub user_id: String,
    pub action: AuditAction,
    /// Resource name the action touched
    pub resource: String,
    pub resource_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Snapshot before the change
    pub old_value: Option<Value>,
    /// Snapshot after the change
    pub new_value: Option<Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
}

/// Caller-supplied part of an event; everything else is filled in by the
/// log (id, tenant, user, client context, timestamp, derived fields).
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: BTreeMap<String, Value>,
    /// Explicit severity; derived from the action when absent
    pub severity: Option<AuditSeverity>,
    /// Explicit category; derived from the action when absent
    pub category: Option<AuditCategory>,
}

impl AuditDraft {
    /// Draft for `action` on `resource`.
    pub fn new(action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            action,
            resource: resource.into(),
            resource_id: None,
            old_value: None,
            new_value: None,
            metadata: BTreeMap::new(),
            severity: None,
            category: None,
        }
    }

    /// Attach the touched record's id.
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Attach before/after snapshots.
    pub fn values(mut self, old: Option<Value>, new: Option<Value>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Override the derived severity.
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Override the derived category.
    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Add one metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Severity when the caller did not pick one. The category considered is
/// the caller's explicit category only, not the derived one.
pub fn derive_severity(action: AuditAction, explicit_category: Option<AuditCategory>) -> AuditSeverity {
    if explicit_category == Some(AuditCategory::Security) {
        return AuditSeverity::High;
    }
    match action {
        AuditAction::Delete => AuditSeverity::High,
        AuditAction::LoginFailed => AuditSeverity::Medium,
        AuditAction::Create | AuditAction::Update => AuditSeverity::Medium,
        _ => AuditSeverity::Low,
    }
}

/// Category when the caller did not pick one.
pub fn derive_category(action: AuditAction) -> AuditCategory {
    match action {
        AuditAction::Login | AuditAction::Logout | AuditAction::LoginFailed => {
            AuditCategory::Authentication
        }
        AuditAction::Create | AuditAction::Read | AuditAction::Update | AuditAction::Delete => {
            AuditCategory::DataAccess
        }
        AuditAction::PermissionChange | AuditAction::ConfigChange => AuditCategory::Configuration,
        AuditAction::SystemAccess | AuditAction::DataBreachAttempt => AuditCategory::Security,
        _ => AuditCategory::System,
    }
}
