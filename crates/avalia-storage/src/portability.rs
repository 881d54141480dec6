//! Tenant Data Portability & Maintenance
//!
//! Scan-based operations over the substrate: bundle a tenant's data for
//! export, replay a bundle on import, wipe a tenant's namespace, adopt
//! legacy pre-namespacing entries, and report storage usage.

use std::collections::BTreeMap;

use avalia_common::{HealthReport, StoreScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::envelope::{StorageEnvelope, SCHEMA_VERSION};
use crate::store::{ScopedStore, GLOBAL_SEGMENT, STORAGE_PREFIX, TENANT_SEPARATOR};

/// Registry-owned substrate keys are never treated as store entries.
const REGISTRY_KEY_PREFIX: &str = "avalia_tenant_";

/// Portable bundle of one tenant's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantExport {
    /// Tenant the bundle was taken from
    pub tenant_id: String,
    /// Logical key to payload
    pub data: BTreeMap<String, Value>,
    /// When the export was taken
    pub exported_at: DateTime<Utc>,
    /// Envelope schema version at export time
    pub version: String,
}

/// Outcome of a best-effort import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// Entries written
    pub imported: usize,
    /// Per-entry failures; successful entries are not rolled back
    pub errors: Vec<String>,
}

/// Outcome of a legacy-key migration pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Entries adopted into the scope
    pub migrated: usize,
    /// Keys that could not be migrated
    pub errors: Vec<String>,
}

/// Storage usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatistics {
    /// Entries belonging to the inspected tenant
    pub tenant_keys: usize,
    /// Deployment-global entries
    pub global_keys: usize,
    /// Accounted size of every store-owned entry, in bytes
    pub total_size_bytes: usize,
}

impl ScopedStore {
    /// Bundle every entry of `tenant_id` into a portable export.
    /// Unreadable entries are skipped with a diagnostic.
    pub fn export_tenant_data(&self, tenant_id: &str) -> TenantExport {
        let scope = StoreScope::tenant(tenant_id);
        let prefix = Self::scope_prefix(&scope);
        let mut data = BTreeMap::new();

        for storage_key in self.backend().raw_keys() {
            if !storage_key.starts_with(&prefix) {
                continue;
            }
            let Some(raw) = self.backend().raw_get(&storage_key) else {
                continue;
            };
            match serde_json::from_str::<StorageEnvelope>(&raw) {
                Ok(envelope) => {
                    let clean_key = storage_key[prefix.len()..].to_string();
                    data.insert(clean_key, envelope.data);
                }
                Err(err) => {
                    warn!(key = %storage_key, %err, "skipping unreadable entry during export");
                }
            }
        }

        TenantExport {
            tenant_id: tenant_id.to_string(),
            data,
            exported_at: self.clock().now(),
            version: SCHEMA_VERSION.into(),
        }
    }

    /// Replay an exported bundle into `scope`. Best-effort: failed entries
    /// are reported, successful ones stay.
    pub fn import_tenant_data(&self, scope: &StoreScope, export: &TenantExport) -> ImportReport {
        let mut report = ImportReport::default();

        for (key, value) in &export.data {
            if self.set(scope, key, value) {
                report.imported += 1;
            } else {
                report.errors.push(format!("falha ao importar chave {key}"));
            }
        }

        report
    }

    /// Delete every entry of the scope's namespace. Irreversible; the
    /// caller owns any confirmation flow. Returns the number removed.
    pub fn clear_tenant_data(&self, scope: &StoreScope) -> usize {
        let prefix = Self::scope_prefix(scope);
        let mut removed = 0;

        for storage_key in self.backend().raw_keys() {
            if storage_key.starts_with(&prefix) {
                self.backend().raw_remove(&storage_key);
                removed += 1;
            }
        }

        removed
    }

    /// Adopt entries written before tenant namespacing existed: bare
    /// `avalia_`-prefixed keys holding a raw payload. Each is re-written
    /// into `scope` under its stripped key and the legacy key removed.
    pub fn migrate_legacy_entries(&self, scope: &StoreScope) -> MigrationReport {
        let mut report = MigrationReport::default();

        for storage_key in self.backend().raw_keys() {
            if !storage_key.starts_with(STORAGE_PREFIX)
                || storage_key.starts_with(REGISTRY_KEY_PREFIX)
                || storage_key.contains(TENANT_SEPARATOR)
                || storage_key.contains(GLOBAL_SEGMENT)
            {
                continue;
            }
            let Some(raw) = self.backend().raw_get(&storage_key) else {
                continue;
            };

            let clean_key = storage_key[STORAGE_PREFIX.len()..].to_string();
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    if self.set(scope, &clean_key, &value) {
                        self.backend().raw_remove(&storage_key);
                        report.migrated += 1;
                    } else {
                        report
                            .errors
                            .push(format!("falha ao migrar chave {storage_key}"));
                    }
                }
                Err(err) => {
                    report
                        .errors
                        .push(format!("falha ao migrar chave {storage_key}: {err}"));
                }
            }
        }

        report
    }

    /// Usage counters for one tenant plus the global namespace.
    pub fn statistics(&self, tenant_id: &str) -> StorageStatistics {
        let tenant_prefix = Self::scope_prefix(&StoreScope::tenant(tenant_id));
        let global_prefix = Self::scope_prefix(&StoreScope::Global);
        let mut stats = StorageStatistics {
            tenant_keys: 0,
            global_keys: 0,
            total_size_bytes: 0,
        };

        for storage_key in self.backend().raw_keys() {
            if !storage_key.starts_with(STORAGE_PREFIX) {
                continue;
            }
            let Some(raw) = self.backend().raw_get(&storage_key) else {
                continue;
            };
            stats.total_size_bytes += self.backend().byte_size(&storage_key, &raw);

            if storage_key.starts_with(&tenant_prefix) {
                stats.tenant_keys += 1;
            } else if storage_key.starts_with(&global_prefix) {
                stats.global_keys += 1;
            }
        }

        stats
    }

    /// Store health: currently a single usage threshold.
    pub fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();

        let total: usize = self
            .backend()
            .raw_keys()
            .iter()
            .filter(|k| k.starts_with(STORAGE_PREFIX))
            .filter_map(|k| {
                self.backend()
                    .raw_get(k)
                    .map(|v| self.backend().byte_size(k, &v))
            })
            .sum();
        if total > 5 * 1024 * 1024 {
            issues.push("Alto uso de armazenamento (> 5MB)".to_string());
        }

        HealthReport::from_issues(issues)
    }
}
