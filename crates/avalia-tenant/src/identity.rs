//! User Accounts & Permissions
//!
//! Not a full RBAC engine: a user carries a flat permission list and the
//! check is a plain existence test, with the super-admin role granting
//! everything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Access to every tenant
    SuperAdmin,
    /// Administrator of one tenant
    TenantAdmin,
    /// Team manager inside the tenant
    Manager,
    /// Standard evaluator
    Evaluator,
    /// Read-only access
    Viewer,
    /// Temporary limited access
    Guest,
}

/// Operation a permission can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Export,
    Import,
}

/// Reach of a granted permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    Own,
    Team,
    Tenant,
    All,
}

/// One resource grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    /// Resource name ("users", "assessments", "reports", ...)
    pub resource: String,
    /// Allowed operations on the resource
    pub actions: Vec<Action>,
    pub scope: Option<PermissionScope>,
}

impl Permission {
    /// Grant `actions` on `resource` with no scope restriction.
    pub fn new(resource: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            resource: resource.into(),
            actions,
            scope: None,
        }
    }

    /// True when this grant covers `resource`/`action`.
    pub fn allows(&self, resource: &str, action: Action) -> bool {
        self.resource == resource && self.actions.contains(&action)
    }
}

/// User of the platform, always attached to one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub tenant_id: String,
    /// Brazilian personal id; opaque to the core
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserAccount {
    /// Whether the account may perform `action` on `resource`. Super
    /// admins pass unconditionally; everyone else needs a matching grant.
    pub fn has_permission(&self, resource: &str, action: Action) -> bool {
        if self.role == UserRole::SuperAdmin {
            return true;
        }
        self.permissions.iter().any(|p| p.allows(resource, action))
    }
}
