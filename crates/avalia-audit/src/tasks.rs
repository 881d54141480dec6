//! Scheduled Flushing
//!
//! The buffer drains on three triggers beyond its size threshold: a
//! periodic tick, a tenant switch, and drop. The periodic task and the
//! registry subscription both hold a `Weak` so they never keep the log
//! alive on their own.

use std::sync::{Arc, Weak};
use std::time::Duration;

use avalia_tenant::TenantRegistry;
use tokio::task::JoinHandle;

use crate::log::AuditLog;

/// Spawn the periodic flush task. The first flush happens one `period`
/// after the call; the task ends once the log has been dropped.
pub fn start_periodic_flush(audit: &Arc<AuditLog>, period: Duration) -> JoinHandle<()> {
    let weak: Weak<AuditLog> = Arc::downgrade(audit);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            match weak.upgrade() {
                Some(audit) => audit.flush(),
                None => break,
            }
        }
    })
}

/// Flush whenever the active tenant changes, so one tenant's buffered
/// events do not linger across a switch.
pub fn flush_on_tenant_switch(registry: &TenantRegistry, audit: &Arc<AuditLog>) {
    let weak: Weak<AuditLog> = Arc::downgrade(audit);
    registry.subscribe(Box::new(move |_| {
        if let Some(audit) = weak.upgrade() {
            audit.flush();
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditAction, AuditDraft};
    use crate::log::AUDIT_LOG_KEY;
    use avalia_common::{Clock, ManualClock, MemoryBackend};
    use avalia_storage::ScopedStore;
    use avalia_tenant::NewTenant;
    use crate::event::AuditEvent;

    fn wiring() -> (Arc<TenantRegistry>, Arc<ScopedStore>, Arc<AuditLog>) {
        let backend = Arc::new(MemoryBackend::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let registry = Arc::new(TenantRegistry::new(backend.clone(), clock.clone()));
        let store = Arc::new(ScopedStore::new(backend, clock.clone()));
        let audit = Arc::new(AuditLog::new(registry.clone(), store.clone(), clock));
        (registry, store, audit)
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_persists_buffer() {
        let (registry, store, audit) = wiring();

        audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        let handle = start_periodic_flush(&audit, Duration::from_secs(30));

        // Nothing persisted before the first tick.
        let events: Vec<AuditEvent> =
            store.get_or(&registry.current_scope(), AUDIT_LOG_KEY, Vec::new());
        assert!(events.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        let events: Vec<AuditEvent> =
            store.get_or(&registry.current_scope(), AUDIT_LOG_KEY, Vec::new());
        assert_eq!(events.len(), 1);

        handle.abort();
    }

    #[test]
    fn test_flush_on_tenant_switch() {
        let (registry, store, audit) = wiring();
        flush_on_tenant_switch(&registry, &audit);

        audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        let acme = registry.create(NewTenant::named("acme", "Acme")).unwrap();
        registry.switch_active(&acme.id).unwrap();

        // The switch drained the buffer; the event went to durable
        // storage instead of lingering in memory.
        assert_eq!(audit.service_statistics().buffered_events, 0);
        let stored: Vec<AuditEvent> = store.get_or(
            &avalia_common::StoreScope::tenant(acme.id.clone()),
            AUDIT_LOG_KEY,
            Vec::new(),
        );
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_drop_flushes_buffer() {
        let (registry, store, audit) = wiring();

        audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        drop(audit);

        let events: Vec<AuditEvent> =
            store.get_or(&registry.current_scope(), AUDIT_LOG_KEY, Vec::new());
        assert_eq!(events.len(), 1);
    }
}
