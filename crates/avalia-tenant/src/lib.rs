//! Tenant Management for the Avalia Core
//!
//! Owns the authoritative tenant records (create/update/soft-delete/
//! switch), the active-tenant context the storage and audit layers scope
//! themselves to, and the flat permission check.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   TENANT REGISTRY                      │
//! │   ┌─────────┐  ┌─────────┐  ┌─────────┐               │
//! │   │ default │  │  acme   │  │   ...   │  + active ptr │
//! │   └────┬────┘  └────┬────┘  └────┬────┘               │
//! └────────┼────────────┼────────────┼────────────────────┘
//!          ▼            ▼            ▼
//!   persisted as avalia_tenant_<id> on the flat substrate
//! ```

#![warn(missing_docs)]

pub mod identity;
pub mod model;
pub mod registry;

pub use identity::{Action, Permission, PermissionScope, UserAccount, UserRole};
pub use model::{
    NewTenant, Tenant, TenantSettings, TenantSettingsPatch, TenantUpdate, DEFAULT_TENANT_ID,
};
pub use registry::{RegistryStatistics, TenantError, TenantRegistry};
