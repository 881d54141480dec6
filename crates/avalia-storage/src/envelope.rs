//! Storage Envelope
//!
//! Every value the store persists is wrapped in an envelope carrying the
//! write time, the owning tenant and the schema version. Reads validate
//! the envelope before the payload is handed back: a missing field or a
//! foreign tenant id means the entry is not usable by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version stamped on every persisted envelope.
pub const SCHEMA_VERSION: &str = "2.0";

/// Metadata-wrapped record, the unit of persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEnvelope {
    /// Opaque payload
    pub data: Value,
    /// Write time, epoch milliseconds
    pub timestamp: i64,
    /// Owning tenant; `None` marks an explicitly global entry
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    /// Envelope schema version
    pub version: String,
}

impl StorageEnvelope {
    /// Wrap a payload for the given owner.
    pub fn new(data: Value, timestamp: i64, tenant_id: Option<String>) -> Self {
        Self {
            data,
            timestamp,
            tenant_id,
            version: SCHEMA_VERSION.into(),
        }
    }

    /// Whether this envelope belongs to `tenant_id`.
    pub fn owned_by(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref() == Some(tenant_id)
    }
}

/// Payload shape used by the TTL cache: the expiry travels inside the
/// envelope's `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached payload
    pub data: Value,
    /// Expiry instant, epoch milliseconds
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}
