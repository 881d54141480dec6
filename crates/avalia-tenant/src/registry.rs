//! Tenant Lifecycle Management
//!
//! CRUD plus active-tenant selection over a persisted map of tenants.
//! Constructed once at startup with its substrate and clock, then passed
//! by reference into call sites; the active tenant is state of the
//! instance, not of the process.

use std::collections::HashMap;
use std::sync::Arc;

use avalia_common::{Clock, HealthReport, StorageBackend, StoreScope};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::identity::{Action, UserAccount};
use crate::model::{
    is_valid_cnpj, NewTenant, Tenant, TenantMetadata, TenantSettingsPatch, TenantUpdate,
    DEFAULT_TENANT_ID,
};

/// Substrate key prefix for tenant records.
const TENANT_KEY_PREFIX: &str = "avalia_tenant_";
/// Substrate key holding the active-tenant pointer.
const CURRENT_TENANT_KEY: &str = "avalia_tenant_current";

/// Registry operation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantError {
    /// Input violates a business rule. The message is the user-facing,
    /// pt-BR wording the product surfaces.
    #[error("{0}")]
    Validation(String),
    /// Referenced tenant does not exist.
    #[error("tenant not found: {0}")]
    NotFound(String),
    /// Operation targets a soft-deleted tenant.
    #[error("tenant is inactive: {0}")]
    Inactive(String),
}

/// Callback invoked after the active tenant changes.
pub type TenantChangedFn = Box<dyn Fn(&Tenant) + Send + Sync>;

/// Registry snapshot counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_tenants: usize,
    pub active_tenants: usize,
    pub current_tenant_id: Option<String>,
    pub multi_tenant: bool,
}

/// Tenant registry: owns the authoritative tenant records and the active
/// tenant pointer.
pub struct TenantRegistry {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    tenants: RwLock<HashMap<String, Tenant>>,
    active: RwLock<Option<Tenant>>,
    current_user: RwLock<Option<UserAccount>>,
    subscribers: RwLock<Vec<TenantChangedFn>>,
}

impl TenantRegistry {
    /// Load the registry from the substrate, creating the default tenant
    /// on first start or after corrupt state.
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        let registry = Self {
            backend,
            clock,
            tenants: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            current_user: RwLock::new(None),
            subscribers: RwLock::new(Vec::new()),
        };
        registry.initialize_from_storage();
        registry
    }

    fn initialize_from_storage(&self) {
        let mut loaded = HashMap::new();

        for key in self.backend.raw_keys() {
            if !key.starts_with(TENANT_KEY_PREFIX) || key == CURRENT_TENANT_KEY {
                continue;
            }
            let Some(raw) = self.backend.raw_get(&key) else {
                continue;
            };
            match serde_json::from_str::<Tenant>(&raw) {
                Ok(tenant) => {
                    loaded.insert(tenant.id.clone(), tenant);
                }
                Err(err) => {
                    warn!(key, %err, "discarding unreadable tenant record");
                    self.backend.raw_remove(&key);
                }
            }
        }

        if !loaded.contains_key(DEFAULT_TENANT_ID) {
            let default = Tenant::default_tenant(self.clock.as_ref());
            self.persist_tenant(&default);
            loaded.insert(default.id.clone(), default);
        }

        // Restore the active pointer; anything stale falls back to default.
        let pointer = self.backend.raw_get(CURRENT_TENANT_KEY);
        let active = pointer
            .as_deref()
            .and_then(|id| loaded.get(id))
            .filter(|t| t.is_active)
            .or_else(|| loaded.get(DEFAULT_TENANT_ID))
            .cloned();

        *self.tenants.write() = loaded;
        *self.active.write() = active;
    }

    // -- CRUD --

    /// Create a tenant. `name` and `display_name` are required, `name`
    /// must be unique, and a supplied CNPJ must be well-formed.
    pub fn create(&self, request: NewTenant) -> Result<Tenant, TenantError> {
        if request.name.trim().is_empty() || request.display_name.trim().is_empty() {
            return Err(TenantError::Validation(
                "Nome e nome de exibição são obrigatórios".into(),
            ));
        }

        {
            let tenants = self.tenants.read();
            if tenants.values().any(|t| t.name == request.name) {
                return Err(TenantError::Validation(
                    "Já existe um tenant com este nome".into(),
                ));
            }
        }

        if let Some(cnpj) = &request.cnpj {
            if !is_valid_cnpj(cnpj) {
                return Err(TenantError::Validation("CNPJ inválido".into()));
            }
        }

        let now = self.clock.now();
        let tenant = Tenant {
            id: request.id.unwrap_or_else(generate_tenant_id),
            name: request.name,
            display_name: request.display_name,
            cnpj: request.cnpj,
            domain: request.domain,
            is_active: request.is_active.unwrap_or(true),
            settings: request
                .settings
                .unwrap_or_else(TenantSettingsPatch::default)
                .merge_into_defaults(),
            created_at: now,
            updated_at: now,
            metadata: request.metadata.unwrap_or_else(TenantMetadata::default),
        };

        self.tenants
            .write()
            .insert(tenant.id.clone(), tenant.clone());
        self.persist_tenant(&tenant);

        Ok(tenant)
    }

    /// Fetch one tenant, soft-deleted ones included.
    pub fn get(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants.read().get(tenant_id).cloned()
    }

    /// Active tenants, sorted by display name.
    pub fn list(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self
            .tenants
            .read()
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        tenants.sort_by_key(|t| t.display_name.to_lowercase());
        tenants
    }

    /// Apply an update. The id is immutable; the merged record is
    /// re-validated before it replaces the stored one.
    pub fn update(&self, tenant_id: &str, update: TenantUpdate) -> Result<Tenant, TenantError> {
        let updated = {
            let mut tenants = self.tenants.write();
            let existing = tenants
                .get(tenant_id)
                .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;

            let mut updated = existing.clone();
            if let Some(name) = update.name {
                updated.name = name;
            }
            if let Some(display_name) = update.display_name {
                updated.display_name = display_name;
            }
            if let Some(cnpj) = update.cnpj {
                updated.cnpj = Some(cnpj);
            }
            if let Some(domain) = update.domain {
                updated.domain = Some(domain);
            }
            if let Some(is_active) = update.is_active {
                updated.is_active = is_active;
            }
            if let Some(settings) = update.settings {
                updated.settings = settings;
            }
            if let Some(metadata) = update.metadata {
                updated.metadata = metadata;
            }
            updated.id = tenant_id.to_string();
            updated.updated_at = self.clock.now();

            Self::validate(&updated, &tenants)?;

            tenants.insert(tenant_id.to_string(), updated.clone());
            updated
        };

        self.persist_tenant(&updated);
        self.refresh_active_snapshot(&updated);

        Ok(updated)
    }

    /// Soft-delete a tenant. The default tenant is protected; deleting the
    /// active tenant switches the registry back to the default.
    pub fn delete(&self, tenant_id: &str) -> Result<(), TenantError> {
        if tenant_id == DEFAULT_TENANT_ID {
            return Err(TenantError::Validation(
                "Não é possível excluir o tenant padrão".into(),
            ));
        }

        let deleted = {
            let mut tenants = self.tenants.write();
            let tenant = tenants
                .get_mut(tenant_id)
                .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;
            tenant.is_active = false;
            tenant.updated_at = self.clock.now();
            tenant.clone()
        };
        self.persist_tenant(&deleted);

        let was_active = self
            .active
            .read()
            .as_ref()
            .is_some_and(|t| t.id == tenant_id);
        if was_active {
            self.switch_active(DEFAULT_TENANT_ID)?;
        }

        Ok(())
    }

    // -- Active tenant --

    /// Make `tenant_id` the active tenant and notify subscribers.
    pub fn switch_active(&self, tenant_id: &str) -> Result<Tenant, TenantError> {
        let tenant = self
            .get(tenant_id)
            .ok_or_else(|| TenantError::NotFound(tenant_id.to_string()))?;
        if !tenant.is_active {
            return Err(TenantError::Inactive(tenant_id.to_string()));
        }

        *self.active.write() = Some(tenant.clone());
        if let Err(err) = self.backend.raw_set(CURRENT_TENANT_KEY, &tenant.id) {
            warn!(%err, "failed to persist active tenant pointer");
        }

        self.notify_tenant_changed(&tenant);
        Ok(tenant)
    }

    /// Snapshot of the active tenant.
    pub fn current_tenant(&self) -> Option<Tenant> {
        self.active.read().clone()
    }

    /// Active tenant id, falling back to the default tenant.
    pub fn current_tenant_id(&self) -> String {
        self.active
            .read()
            .as_ref()
            .map(|t| t.id.clone())
            .unwrap_or_else(|| DEFAULT_TENANT_ID.to_string())
    }

    /// Storage scope of the active tenant.
    pub fn current_scope(&self) -> StoreScope {
        StoreScope::Tenant(self.current_tenant_id())
    }

    /// Register a tenant-change observer. Callbacks run synchronously
    /// inside `switch_active`.
    pub fn subscribe(&self, callback: TenantChangedFn) {
        self.subscribers.write().push(callback);
    }

    // -- Identity --

    /// Attach or clear the current user.
    pub fn set_current_user(&self, user: Option<UserAccount>) {
        *self.current_user.write() = user;
    }

    /// Snapshot of the current user.
    pub fn current_user(&self) -> Option<UserAccount> {
        self.current_user.read().clone()
    }

    /// Permission check against the current user; anonymous callers have
    /// no permissions.
    pub fn has_permission(&self, resource: &str, action: Action) -> bool {
        self.current_user
            .read()
            .as_ref()
            .is_some_and(|user| user.has_permission(resource, action))
    }

    // -- Introspection --

    /// True once more than one tenant exists.
    pub fn is_multi_tenant(&self) -> bool {
        self.tenants.read().len() > 1
    }

    /// Registry counters.
    pub fn statistics(&self) -> RegistryStatistics {
        let tenants = self.tenants.read();
        RegistryStatistics {
            total_tenants: tenants.len(),
            active_tenants: tenants.values().filter(|t| t.is_active).count(),
            current_tenant_id: self.active.read().as_ref().map(|t| t.id.clone()),
            multi_tenant: tenants.len() > 1,
        }
    }

    /// Registry health.
    pub fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();
        if self.tenants.read().is_empty() {
            issues.push("Nenhum tenant carregado".to_string());
        }
        if self.active.read().is_none() {
            issues.push("Nenhum tenant ativo".to_string());
        }
        if self.backend.raw_get(CURRENT_TENANT_KEY).is_none() {
            issues.push("Tenant atual não persistido".to_string());
        }
        HealthReport::from_issues(issues)
    }

    /// Wipe every registry key from the substrate and start over with a
    /// fresh default tenant.
    pub fn reset(&self) {
        for key in self.backend.raw_keys() {
            if key.starts_with(TENANT_KEY_PREFIX) {
                self.backend.raw_remove(&key);
            }
        }
        self.backend.raw_remove(CURRENT_TENANT_KEY);

        self.tenants.write().clear();
        *self.active.write() = None;
        *self.current_user.write() = None;

        self.initialize_from_storage();
    }

    // -- Internals --

    fn validate(
        tenant: &Tenant,
        tenants: &HashMap<String, Tenant>,
    ) -> Result<(), TenantError> {
        if tenant.name.trim().is_empty() {
            return Err(TenantError::Validation("Nome do tenant é obrigatório".into()));
        }
        if tenant.display_name.trim().is_empty() {
            return Err(TenantError::Validation(
                "Nome de exibição é obrigatório".into(),
            ));
        }
        if let Some(cnpj) = &tenant.cnpj {
            if !is_valid_cnpj(cnpj) {
                return Err(TenantError::Validation("CNPJ inválido".into()));
            }
        }
        if tenants
            .values()
            .any(|t| t.name == tenant.name && t.id != tenant.id)
        {
            return Err(TenantError::Validation(
                "Já existe um tenant com este nome".into(),
            ));
        }
        Ok(())
    }

    fn persist_tenant(&self, tenant: &Tenant) {
        let key = format!("{TENANT_KEY_PREFIX}{}", tenant.id);
        match serde_json::to_string(tenant) {
            Ok(raw) => {
                if let Err(err) = self.backend.raw_set(&key, &raw) {
                    warn!(tenant_id = %tenant.id, %err, "failed to persist tenant record");
                }
            }
            Err(err) => warn!(tenant_id = %tenant.id, %err, "failed to serialize tenant record"),
        }
    }

    fn refresh_active_snapshot(&self, updated: &Tenant) {
        let mut active = self.active.write();
        if active.as_ref().is_some_and(|t| t.id == updated.id) {
            *active = Some(updated.clone());
        }
    }

    fn notify_tenant_changed(&self, tenant: &Tenant) {
        for callback in self.subscribers.read().iter() {
            callback(tenant);
        }
    }
}

fn generate_tenant_id() -> String {
    format!("tenant_{}", Uuid::new_v4().simple())
}
