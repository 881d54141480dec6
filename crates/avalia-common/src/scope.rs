//! Explicit storage scope.
//!
//! Every storage call names the namespace it targets. There is no ambient
//! "current tenant" inside the store: the caller resolves its tenant once
//! and passes the scope down, so a tenant switch between a call's issuance
//! and completion cannot retarget it.

/// Namespace a storage operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Data owned by one tenant.
    Tenant(String),
    /// Deployment-wide data, shared across tenants.
    Global,
}

impl StoreScope {
    /// Scope for the given tenant id.
    pub fn tenant(id: impl Into<String>) -> Self {
        Self::Tenant(id.into())
    }

    /// Owning tenant id, if tenant-scoped.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::Tenant(id) => Some(id),
            Self::Global => None,
        }
    }

    /// True for the global namespace.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_accessors() {
        let scope = StoreScope::tenant("acme");
        assert_eq!(scope.tenant_id(), Some("acme"));
        assert!(!scope.is_global());
        assert!(StoreScope::Global.is_global());
    }
}
