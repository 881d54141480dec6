//! Scoped Key-Value Store
//!
//! Namespacing and tenant-safety over the flat substrate. Isolation is
//! enforced twice: the key carries the tenant segment, and every
//! non-global read re-checks the envelope's owner. The second check is
//! what catches a read that was issued for one tenant but lands after the
//! caller switched to another.

use std::sync::Arc;

use avalia_common::{Clock, StorageBackend, StoreScope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::envelope::{CacheEntry, StorageEnvelope};

/// Prefix of every key this store owns on the substrate.
pub const STORAGE_PREFIX: &str = "avalia_";
/// Segment between tenant id and logical key.
pub const TENANT_SEPARATOR: &str = "__tenant__";
/// Segment marking deployment-global entries.
pub const GLOBAL_SEGMENT: &str = "global__";

/// Prefix for TTL-cache logical keys.
const CACHE_PREFIX: &str = "cache_";

/// Tenant-scoped view over the flat substrate.
pub struct ScopedStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
}

impl ScopedStore {
    /// Store over the given substrate and clock.
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub(crate) fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Full substrate key for a logical key in a scope.
    pub fn namespaced_key(scope: &StoreScope, key: &str) -> String {
        match scope {
            StoreScope::Tenant(id) => format!("{STORAGE_PREFIX}{id}{TENANT_SEPARATOR}{key}"),
            StoreScope::Global => format!("{STORAGE_PREFIX}{GLOBAL_SEGMENT}{key}"),
        }
    }

    /// Substrate prefix covering every entry of a scope.
    pub(crate) fn scope_prefix(scope: &StoreScope) -> String {
        Self::namespaced_key(scope, "")
    }

    // -- Core operations --

    /// Envelope-wrap and persist a value. Returns `false` on substrate
    /// failure (quota) or unserializable input; never panics.
    pub fn set<T: Serialize>(&self, scope: &StoreScope, key: &str, value: &T) -> bool {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, %err, "value not serializable, write dropped");
                return false;
            }
        };

        let envelope = StorageEnvelope::new(
            data,
            self.clock.now_millis(),
            scope.tenant_id().map(str::to_string),
        );
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, %err, "envelope not serializable, write dropped");
                return false;
            }
        };

        match self.backend.raw_set(&Self::namespaced_key(scope, key), &raw) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, %err, "substrate rejected write");
                false
            }
        }
    }

    /// Read a value. Absent, corrupt or foreign-tenant entries all come
    /// back as `None`; corrupt entries are deleted on the way (self-heal).
    pub fn get<T: DeserializeOwned>(&self, scope: &StoreScope, key: &str) -> Option<T> {
        let storage_key = Self::namespaced_key(scope, key);
        let raw = self.backend.raw_get(&storage_key)?;

        let envelope: StorageEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key, %err, "invalid storage envelope, removing entry");
                self.backend.raw_remove(&storage_key);
                return None;
            }
        };

        if let StoreScope::Tenant(tenant_id) = scope {
            if !envelope.owned_by(tenant_id) {
                warn!(key, tenant_id, "tenant mismatch on read, treating as absent");
                return None;
            }
        }

        match serde_json::from_value(envelope.data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "stored payload has unexpected shape");
                None
            }
        }
    }

    /// Read with a fallback value.
    pub fn get_or<T: DeserializeOwned>(&self, scope: &StoreScope, key: &str, default: T) -> T {
        self.get(scope, key).unwrap_or(default)
    }

    /// Delete an entry.
    pub fn remove(&self, scope: &StoreScope, key: &str) {
        self.backend.raw_remove(&Self::namespaced_key(scope, key));
    }

    /// Existence check.
    pub fn has(&self, scope: &StoreScope, key: &str) -> bool {
        self.backend
            .raw_get(&Self::namespaced_key(scope, key))
            .is_some()
    }

    // -- TTL cache --

    /// Store a value with a time-to-live. The expiry travels inside the
    /// payload; expiry is checked lazily on read, there is no sweeper.
    pub fn set_cache<T: Serialize>(
        &self,
        scope: &StoreScope,
        key: &str,
        value: &T,
        ttl_minutes: i64,
    ) -> bool {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, %err, "cache value not serializable, write dropped");
                return false;
            }
        };
        let entry = CacheEntry {
            data,
            expires_at: self.clock.now_millis() + ttl_minutes * 60_000,
        };
        self.set(scope, &format!("{CACHE_PREFIX}{key}"), &entry)
    }

    /// Read a cached value, deleting it transparently once expired.
    pub fn get_cache<T: DeserializeOwned>(&self, scope: &StoreScope, key: &str) -> Option<T> {
        let cache_key = format!("{CACHE_PREFIX}{key}");
        let entry: CacheEntry = self.get(scope, &cache_key)?;

        if self.clock.now_millis() > entry.expires_at {
            self.remove(scope, &cache_key);
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "cached payload has unexpected shape");
                None
            }
        }
    }

    /// Sweep expired (and unreadable) cache entries of a scope. Returns
    /// the number of entries removed.
    pub fn cleanup_expired_cache(&self, scope: &StoreScope) -> usize {
        let prefix = format!("{}{CACHE_PREFIX}", Self::scope_prefix(scope));
        let now = self.clock.now_millis();
        let mut cleaned = 0;

        for storage_key in self.backend.raw_keys() {
            if !storage_key.starts_with(&prefix) {
                continue;
            }
            let Some(raw) = self.backend.raw_get(&storage_key) else {
                continue;
            };

            let expired = serde_json::from_str::<StorageEnvelope>(&raw)
                .ok()
                .and_then(|envelope| serde_json::from_value::<CacheEntry>(envelope.data).ok())
                .map_or(true, |entry| now > entry.expires_at);

            if expired {
                self.backend.raw_remove(&storage_key);
                cleaned += 1;
            }
        }

        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalia_common::{ManualClock, MemoryBackend};
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn store_with_clock() -> (ScopedStore, ManualClock, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = ManualClock::starting_now();
        let store = ScopedStore::new(backend.clone(), Arc::new(clock.clone()));
        (store, clock, backend)
    }

    #[test]
    fn test_tenant_isolation() {
        let (store, _, _) = store_with_clock();
        let tenant_a = StoreScope::tenant("tenant_a");
        let tenant_b = StoreScope::tenant("tenant_b");

        assert!(store.set(&tenant_a, "profile", &json!({"name": "Bob"})));

        // Same logical key, different tenant: nothing there.
        assert_eq!(store.get::<Value>(&tenant_b, "profile"), None);
        assert_eq!(
            store.get::<Value>(&tenant_a, "profile"),
            Some(json!({"name": "Bob"}))
        );
    }

    #[test]
    fn test_global_entries_are_shared() {
        let (store, _, _) = store_with_clock();

        assert!(store.set(&StoreScope::Global, "announcement", &"maintenance"));
        assert_eq!(
            store.get::<String>(&StoreScope::Global, "announcement"),
            Some("maintenance".into())
        );
    }

    #[test]
    fn test_envelope_owner_checked_even_when_key_matches() {
        let (store, clock, backend) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");

        // An entry written under tenant_a's key space but stamped with a
        // different owner (stale write surviving a tenant switch).
        let foreign = StorageEnvelope::new(json!(42), clock.now_millis(), Some("tenant_b".into()));
        backend
            .raw_set(
                &ScopedStore::namespaced_key(&scope, "counter"),
                &serde_json::to_string(&foreign).unwrap(),
            )
            .unwrap();

        assert_eq!(store.get::<Value>(&scope, "counter"), None);
        // The mismatched entry is left in place, only hidden.
        assert!(store.has(&scope, "counter"));
    }

    #[test]
    fn test_corrupt_entry_is_self_healed() {
        let (store, _, backend) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");
        let storage_key = ScopedStore::namespaced_key(&scope, "broken");

        backend.raw_set(&storage_key, "{not valid json").unwrap();

        assert_eq!(store.get::<Value>(&scope, "broken"), None);
        assert_eq!(backend.raw_get(&storage_key), None);
    }

    #[test]
    fn test_set_returns_false_on_quota() {
        let backend = Arc::new(MemoryBackend::with_quota(64));
        let store = ScopedStore::new(backend, Arc::new(ManualClock::starting_now()));
        let scope = StoreScope::tenant("tenant_a");

        let big = "x".repeat(512);
        assert!(!store.set(&scope, "big", &big));
    }

    #[test]
    fn test_cache_ttl_expiry() {
        let (store, clock, _) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");

        assert!(store.set_cache(&scope, "session", &"token", 1));
        assert_eq!(
            store.get_cache::<String>(&scope, "session"),
            Some("token".into())
        );

        clock.advance(Duration::minutes(61));
        assert_eq!(store.get_cache::<String>(&scope, "session"), None);
        // Expired entry was deleted, not just hidden.
        assert!(!store.has(&scope, "cache_session"));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let (store, clock, _) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");

        assert!(store.set_cache(&scope, "flash", &1, 0));
        clock.advance(Duration::seconds(1));

        assert_eq!(store.get_cache::<i64>(&scope, "flash"), None);
    }

    #[test]
    fn test_cleanup_expired_cache() {
        let (store, clock, backend) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");

        store.set_cache(&scope, "old", &1, 1);
        store.set_cache(&scope, "fresh", &2, 120);
        // Unreadable cache entry is swept too.
        backend
            .raw_set(
                &ScopedStore::namespaced_key(&scope, "cache_junk"),
                "garbage",
            )
            .unwrap();

        clock.advance(Duration::minutes(2));
        assert_eq!(store.cleanup_expired_cache(&scope), 2);
        assert_eq!(store.get_cache::<i64>(&scope, "fresh"), Some(2));
    }

    #[test]
    fn test_remove_and_has() {
        let (store, _, _) = store_with_clock();
        let scope = StoreScope::tenant("tenant_a");

        store.set(&scope, "k", &1);
        assert!(store.has(&scope, "k"));

        store.remove(&scope, "k");
        assert!(!store.has(&scope, "k"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_strings(value in ".*") {
            let (store, _, _) = store_with_clock();
            let scope = StoreScope::tenant("tenant_a");

            prop_assert!(store.set(&scope, "k", &value));
            prop_assert_eq!(store.get::<String>(&scope, "k"), Some(value));
        }

        #[test]
        fn prop_roundtrip_numbers(value in any::<i64>()) {
            let (store, _, _) = store_with_clock();
            let scope = StoreScope::tenant("tenant_a");

            prop_assert!(store.set(&scope, "k", &value));
            prop_assert_eq!(store.get::<i64>(&scope, "k"), Some(value));
        }

        #[test]
        fn prop_roundtrip_maps(entries in proptest::collection::btree_map("[a-z]{1,8}", any::<u32>(), 0..8)) {
            let (store, _, _) = store_with_clock();
            let scope = StoreScope::tenant("tenant_a");

            prop_assert!(store.set(&scope, "k", &entries));
            prop_assert_eq!(
                store.get::<std::collections::BTreeMap<String, u32>>(&scope, "k"),
                Some(entries)
            );
        }
    }
}
