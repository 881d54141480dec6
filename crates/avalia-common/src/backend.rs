//! Flat key-value substrate contract.
//!
//! The core never talks to a concrete storage medium directly; everything
//! goes through [`StorageBackend`]. The substrate is a single shared flat
//! namespace owned by exactly one process — multi-writer coordination is
//! deliberately not part of the contract.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Substrate failures. Writes can fail on quota exhaustion; that is a
/// recoverable condition callers must handle, never a crash.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The write would exceed the substrate's storage quota.
    #[error("storage quota exceeded ({used} of {limit} bytes used)")]
    QuotaExceeded {
        /// Bytes currently stored.
        used: usize,
        /// Configured quota in bytes.
        limit: usize,
    },
    /// The substrate rejected the operation for another reason.
    #[error("storage backend failure: {0}")]
    Io(String),
}

/// Contract the environment must provide: a flat string-to-string table
/// with scan support.
pub trait StorageBackend: Send + Sync {
    /// Read the raw value stored under `key`.
    fn raw_get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`. Quota exhaustion is reported as
    /// [`BackendError::QuotaExceeded`].
    fn raw_set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove `key` if present.
    fn raw_remove(&self, key: &str);

    /// All keys currently stored, for scan-based operations.
    fn raw_keys(&self) -> Vec<String>;

    /// Accounted size of one entry, for storage statistics.
    fn byte_size(&self, key: &str, value: &str) -> usize {
        key.len() + value.len()
    }
}

/// In-process substrate over a guarded hash map.
///
/// The default backend for tests and for hosts that keep the whole data
/// set in memory. An optional byte quota makes the quota-exhaustion path
/// exercisable.
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    /// Unbounded backend.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            quota_bytes: None,
        }
    }

    /// Backend that rejects writes once `quota_bytes` of key+value data
    /// is stored.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn raw_get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn raw_set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self.entries.write();

        if let Some(limit) = self.quota_bytes {
            let existing = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let used = Self::used_bytes(&entries) - existing;
            if used + key.len() + value.len() > limit {
                return Err(BackendError::QuotaExceeded { used, limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn raw_remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn raw_keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let backend = MemoryBackend::new();

        backend.raw_set("k1", "v1").unwrap();
        assert_eq!(backend.raw_get("k1").as_deref(), Some("v1"));

        backend.raw_remove("k1");
        assert_eq!(backend.raw_get("k1"), None);
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let backend = MemoryBackend::with_quota(10);

        backend.raw_set("ab", "cd").unwrap();
        let err = backend.raw_set("key2", "too-long-value").unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded { .. }));

        // Overwriting within quota still works.
        backend.raw_set("ab", "ef").unwrap();
        assert_eq!(backend.raw_get("ab").as_deref(), Some("ef"));
    }

    #[test]
    fn test_keys_scan() {
        let backend = MemoryBackend::new();
        backend.raw_set("a", "1").unwrap();
        backend.raw_set("b", "2").unwrap();

        let mut keys = backend.raw_keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
