//! Audit Trail for the Avalia Core
//!
//! Append-only record of state changes and security-relevant actions,
//! buffered in memory for write efficiency and flushed to the
//! tenant-scoped store on cadence, on tenant switch, on teardown, and
//! immediately for critical events. Queries, day-window statistics,
//! retention cleanup and JSON/CSV export operate on the active tenant's
//! trail.

#![warn(missing_docs)]

pub mod event;
pub mod log;
pub mod report;
pub mod tasks;

pub use event::{AuditAction, AuditCategory, AuditDraft, AuditEvent, AuditSeverity};
pub use log::{
    AuditLog, AuditQuery, AuditServiceStatistics, ClientContext, AUDIT_LOG_KEY,
    DEFAULT_BUFFER_THRESHOLD, DEFAULT_FLUSH_INTERVAL, PERSISTED_EVENT_CAP,
};
pub use report::{AuditStatistics, ExportFormat, UserActivity};
pub use tasks::{flush_on_tenant_switch, start_periodic_flush};
