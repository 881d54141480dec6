//! Buffered Audit Log
//!
//! Events are buffered in memory and flushed to the scoped store on a
//! cadence, on teardown, and immediately for critical events. The
//! persisted trail is capped at the most recent entries per tenant.
//! Logging is best-effort by contract: a failure here is traced and
//! swallowed, never surfaced to the operation being recorded.

use std::collections::BTreeMap;
use std::sync::Arc;

use avalia_common::{Clock, HealthReport};
use avalia_storage::ScopedStore;
use avalia_tenant::TenantRegistry;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::event::{
    derive_category, derive_severity, AuditAction, AuditCategory, AuditDraft, AuditEvent,
    AuditSeverity,
};

/// Logical key the persisted trail lives under, per tenant.
pub const AUDIT_LOG_KEY: &str = "audit_logs";
/// Buffered events that force a flush.
pub const DEFAULT_BUFFER_THRESHOLD: usize = 100;
/// Persisted events kept per tenant; older entries fall off on flush.
pub const PERSISTED_EVENT_CAP: usize = 1000;
/// Default cadence of the periodic flush task.
pub const DEFAULT_FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Request-level context stamped onto every event while set.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Filter and pagination options for trail queries.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub category: Option<AuditCategory>,
    pub severity: Option<AuditSeverity>,
    /// Case-insensitive substring match on the resource name
    pub resource: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(start) = self.start_date {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if event.timestamp > end {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if &event.user_id != user_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if event.action != action {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(resource) = &self.resource {
            if !event
                .resource
                .to_lowercase()
                .contains(&resource.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Buffer fill counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditServiceStatistics {
    pub buffered_events: usize,
    pub buffer_threshold: usize,
    pub persisted_cap: usize,
}

/// Durable, queryable trail of sensitive actions.
pub struct AuditLog {
    registry: Arc<TenantRegistry>,
    store: Arc<ScopedStore>,
    clock: Arc<dyn Clock>,
    buffer: Mutex<Vec<AuditEvent>>,
    buffer_threshold: usize,
    client_context: RwLock<ClientContext>,
}

impl AuditLog {
    /// Log wired to its registry (tenant/user context) and store
    /// (persistence), with the default buffer threshold.
    pub fn new(
        registry: Arc<TenantRegistry>,
        store: Arc<ScopedStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_buffer_threshold(registry, store, clock, DEFAULT_BUFFER_THRESHOLD)
    }

    /// Log with a custom buffer threshold.
    pub fn with_buffer_threshold(
        registry: Arc<TenantRegistry>,
        store: Arc<ScopedStore>,
        clock: Arc<dyn Clock>,
        buffer_threshold: usize,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            buffer: Mutex::new(Vec::new()),
            buffer_threshold,
            client_context: RwLock::new(ClientContext::default()),
        }
    }

    /// Stamp subsequent events with the caller's network context.
    pub fn set_client_context(&self, context: ClientContext) {
        *self.client_context.write() = context;
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // -- Logging --

    /// Record an event. Fills tenant, user and client context, derives
    /// severity/category when not supplied, and buffers the result.
    /// Critical events and a full buffer flush immediately. Returns the
    /// event id.
    pub fn log(&self, draft: AuditDraft) -> String {
        let tenant = self.registry.current_tenant();
        let user = self.registry.current_user();
        let context = self.client_context.read().clone();

        let severity = draft
            .severity
            .unwrap_or_else(|| derive_severity(draft.action, draft.category));
        let category = draft
            .category
            .unwrap_or_else(|| derive_category(draft.action));

        let mut metadata: BTreeMap<String, Value> = BTreeMap::new();
        if let Some(tenant) = &tenant {
            metadata.insert("tenant_name".into(), json!(tenant.display_name));
        }
        if let Some(user) = &user {
            metadata.insert("user_name".into(), json!(user.name));
        }
        metadata.extend(draft.metadata);

        let event = AuditEvent {
            id: generate_event_id(),
            tenant_id: tenant
                .map(|t| t.id)
                .unwrap_or_else(|| avalia_tenant::DEFAULT_TENANT_ID.to_string()),
            user_id: user.map(|u| u.id).unwrap_or_else(|| "anonymous".to_string()),
            action: draft.action,
            resource: draft.resource,
            resource_id: draft.resource_id,
            timestamp: self.clock.now(),
            ip_address: context.ip_address,
            user_agent: context.user_agent,
            old_value: draft.old_value,
            new_value: draft.new_value,
            metadata,
            severity,
            category,
        };
        let event_id = event.id.clone();

        let buffered = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            buffer.len()
        };

        if severity == AuditSeverity::Critical || buffered >= self.buffer_threshold {
            self.flush();
        }

        event_id
    }

    /// Record an authentication event.
    pub fn log_auth(&self, action: AuditAction, metadata: BTreeMap<String, Value>) -> String {
        let severity = if action == AuditAction::LoginFailed {
            AuditSeverity::Medium
        } else {
            AuditSeverity::Low
        };
        let mut draft = AuditDraft::new(action, "authentication")
            .category(AuditCategory::Authentication)
            .severity(severity);
        draft.metadata = metadata;
        self.log(draft)
    }

    /// Record a CRUD access with before/after snapshots.
    pub fn log_data_access(
        &self,
        action: AuditAction,
        resource: impl Into<String>,
        resource_id: Option<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> String {
        let severity = match action {
            AuditAction::Delete => AuditSeverity::High,
            AuditAction::Read => AuditSeverity::Low,
            _ => AuditSeverity::Medium,
        };
        let mut draft = AuditDraft::new(action, resource)
            .category(AuditCategory::DataAccess)
            .severity(severity)
            .values(old_value, new_value);
        draft.resource_id = resource_id;
        self.log(draft)
    }

    /// Record a configuration change.
    pub fn log_config_change(
        &self,
        resource: impl Into<String>,
        old_value: Value,
        new_value: Value,
    ) -> String {
        self.log(
            AuditDraft::new(AuditAction::Update, resource)
                .category(AuditCategory::Configuration)
                .severity(AuditSeverity::High)
                .values(Some(old_value), Some(new_value)),
        )
    }

    /// Record a security event with its description.
    pub fn log_security(
        &self,
        action: AuditAction,
        description: impl Into<String>,
        severity: AuditSeverity,
    ) -> String {
        self.log(
            AuditDraft::new(action, "security")
                .category(AuditCategory::Security)
                .severity(severity)
                .meta("description", json!(description.into())),
        )
    }

    // -- Persistence --

    /// Move buffered events into the store: merge with the active
    /// tenant's persisted trail, newest first, capped. Failures are
    /// traced and swallowed.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return;
        }

        let scope = self.registry.current_scope();
        let mut events: Vec<AuditEvent> = self.store.get_or(&scope, AUDIT_LOG_KEY, Vec::new());
        events.append(&mut buffer);
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(PERSISTED_EVENT_CAP);

        if self.store.set(&scope, AUDIT_LOG_KEY, &events) {
            debug!(persisted = events.len(), "audit buffer flushed");
        } else {
            error!("failed to persist audit buffer, events dropped");
        }
    }

    // -- Queries --

    /// Query the trail of the active tenant. Flushes first so the result
    /// includes just-buffered events.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        self.flush();

        let scope = self.registry.current_scope();
        let events: Vec<AuditEvent> = self.store.get_or(&scope, AUDIT_LOG_KEY, Vec::new());

        let mut matched: Vec<AuditEvent> =
            events.into_iter().filter(|e| query.matches(e)).collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(100);
        matched.into_iter().skip(offset).take(limit).collect()
    }

    /// Events of the last 24 hours.
    pub fn recent_activity(&self, limit: usize) -> Vec<AuditEvent> {
        self.query(&AuditQuery {
            start_date: Some(self.clock.now() - Duration::hours(24)),
            limit: Some(limit),
            ..AuditQuery::default()
        })
    }

    /// Critical events of the last 7 days.
    pub fn critical_alerts(&self, limit: usize) -> Vec<AuditEvent> {
        self.query(&AuditQuery {
            severity: Some(AuditSeverity::Critical),
            start_date: Some(self.clock.now() - Duration::days(7)),
            limit: Some(limit),
            ..AuditQuery::default()
        })
    }

    // -- Maintenance --

    /// Drop persisted events older than the retention window. Returns the
    /// number removed and records the cleanup itself as a low-severity
    /// system event (which cannot re-trigger a cleanup).
    pub fn cleanup_old_logs(&self, retention_days: i64) -> usize {
        let cutoff = self.clock.now() - Duration::days(retention_days);
        let scope = self.registry.current_scope();

        let events: Vec<AuditEvent> = self.store.get_or(&scope, AUDIT_LOG_KEY, Vec::new());
        let total = events.len();
        let kept: Vec<AuditEvent> = events
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect();
        let removed = total - kept.len();

        if !self.store.set(&scope, AUDIT_LOG_KEY, &kept) {
            error!("failed to persist trail after retention cleanup");
            return 0;
        }

        self.log(
            AuditDraft::new(AuditAction::SystemAccess, AUDIT_LOG_KEY)
                .category(AuditCategory::System)
                .severity(AuditSeverity::Low)
                .meta("operation", json!("cleanup"))
                .meta("removed_count", json!(removed))
                .meta("retention_days", json!(retention_days)),
        );

        removed
    }

    /// Buffer fill counters.
    pub fn service_statistics(&self) -> AuditServiceStatistics {
        AuditServiceStatistics {
            buffered_events: self.buffer.lock().len(),
            buffer_threshold: self.buffer_threshold,
            persisted_cap: PERSISTED_EVENT_CAP,
        }
    }

    /// Service health: warns once the buffer nears its threshold.
    pub fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();
        if self.buffer.lock().len() * 10 >= self.buffer_threshold * 8 {
            issues.push("Buffer de auditoria próximo do limite".to_string());
        }
        HealthReport::from_issues(issues)
    }
}

impl Drop for AuditLog {
    // Teardown persists whatever is still buffered.
    fn drop(&mut self) {
        self.flush();
    }
}

fn generate_event_id() -> String {
    format!("audit_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avalia_common::{ManualClock, MemoryBackend};
    use avalia_tenant::{NewTenant, DEFAULT_TENANT_ID};

    struct Fixture {
        registry: Arc<TenantRegistry>,
        store: Arc<ScopedStore>,
        clock: ManualClock,
        audit: AuditLog,
    }

    fn fixture() -> Fixture {
        fixture_with_threshold(DEFAULT_BUFFER_THRESHOLD)
    }

    fn fixture_with_threshold(threshold: usize) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let clock = ManualClock::starting_now();
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let registry = Arc::new(TenantRegistry::new(backend.clone(), clock_arc.clone()));
        let store = Arc::new(ScopedStore::new(backend, clock_arc.clone()));
        let audit = AuditLog::with_buffer_threshold(
            registry.clone(),
            store.clone(),
            clock_arc,
            threshold,
        );
        Fixture {
            registry,
            store,
            clock,
            audit,
        }
    }

    fn persisted(fixture: &Fixture) -> Vec<AuditEvent> {
        fixture
            .store
            .get_or(&fixture.registry.current_scope(), AUDIT_LOG_KEY, Vec::new())
    }

    #[test]
    fn test_log_buffers_until_flush() {
        let f = fixture();

        let id = f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        assert!(id.starts_with("audit_"));
        assert!(persisted(&f).is_empty());

        f.audit.flush();
        let events = persisted(&f);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].user_id, "anonymous");
        assert_eq!(events[0].tenant_id, DEFAULT_TENANT_ID);
    }

    #[test]
    fn test_critical_event_flushes_immediately() {
        let f = fixture();

        f.audit.log(
            AuditDraft::new(AuditAction::DataBreachAttempt, "vault")
                .severity(AuditSeverity::Critical),
        );

        // Queryable without any explicit flush or timer tick.
        let events = persisted(&f);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, AuditSeverity::Critical);
    }

    #[test]
    fn test_full_buffer_flushes() {
        let f = fixture_with_threshold(3);

        for _ in 0..2 {
            f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        }
        assert!(persisted(&f).is_empty());

        f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        assert_eq!(persisted(&f).len(), 3);
    }

    #[test]
    fn test_query_is_newest_first_and_complete() {
        let f = fixture();

        let mut ids = Vec::new();
        for i in 0..5 {
            f.clock.advance(Duration::seconds(1));
            ids.push(f.audit.log(
                AuditDraft::new(AuditAction::Update, format!("doc_{i}")),
            ));
        }
        f.audit.flush();

        let events = f.audit.query(&AuditQuery {
            limit: Some(5),
            ..AuditQuery::default()
        });
        assert_eq!(events.len(), 5);
        let returned: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        let expected: Vec<&str> = ids.iter().rev().map(String::as_str).collect();
        assert_eq!(returned, expected);
    }

    #[test]
    fn test_query_filters() {
        let f = fixture();

        f.audit.log(AuditDraft::new(AuditAction::Delete, "profile"));
        f.audit.log(AuditDraft::new(AuditAction::Read, "profile"));
        f.audit.log(AuditDraft::new(AuditAction::Login, "authentication"));

        let deletes = f.audit.query(&AuditQuery {
            action: Some(AuditAction::Delete),
            ..AuditQuery::default()
        });
        assert_eq!(deletes.len(), 1);

        let auth = f.audit.query(&AuditQuery {
            category: Some(AuditCategory::Authentication),
            ..AuditQuery::default()
        });
        assert_eq!(auth.len(), 1);

        let by_resource = f.audit.query(&AuditQuery {
            resource: Some("PROF".into()),
            ..AuditQuery::default()
        });
        assert_eq!(by_resource.len(), 2);
    }

    #[test]
    fn test_query_pagination() {
        let f = fixture();
        for _ in 0..10 {
            f.clock.advance(Duration::seconds(1));
            f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        }

        let page = f.audit.query(&AuditQuery {
            offset: Some(4),
            limit: Some(3),
            ..AuditQuery::default()
        });
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn test_persisted_trail_is_capped() {
        let f = fixture_with_threshold(usize::MAX);

        for _ in 0..PERSISTED_EVENT_CAP + 50 {
            f.clock.advance(Duration::milliseconds(1));
            f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        }
        f.audit.flush();

        assert_eq!(persisted(&f).len(), PERSISTED_EVENT_CAP);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let f = fixture();

        f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        f.audit.flush();
        f.clock.advance(Duration::days(100));
        f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        f.audit.flush();

        let removed = f.audit.cleanup_old_logs(90);
        assert_eq!(removed, 1);

        // The cleanup left its own trace, low severity.
        f.audit.flush();
        let events = persisted(&f);
        let cleanup_event = events
            .iter()
            .find(|e| e.action == AuditAction::SystemAccess)
            .unwrap();
        assert_eq!(cleanup_event.severity, AuditSeverity::Low);
        assert_eq!(cleanup_event.metadata["removed_count"], json!(1));
    }

    #[test]
    fn test_tenant_switch_keeps_trails_apart() {
        let f = fixture();
        let acme = f
            .registry
            .create(NewTenant::named("acme", "Acme Corp"))
            .unwrap();

        f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        f.audit.flush();

        f.registry.switch_active(&acme.id).unwrap();
        f.audit.log(AuditDraft::new(AuditAction::Update, "profile"));
        f.audit.flush();

        let acme_events = f.audit.query(&AuditQuery::default());
        assert_eq!(acme_events.len(), 1);
        assert_eq!(acme_events[0].action, AuditAction::Update);

        f.registry.switch_active(DEFAULT_TENANT_ID).unwrap();
        let default_events = f.audit.query(&AuditQuery::default());
        assert_eq!(default_events.len(), 1);
        assert_eq!(default_events[0].action, AuditAction::Read);
    }

    #[test]
    fn test_convenience_wrappers() {
        let f = fixture();

        f.audit.log_auth(AuditAction::LoginFailed, BTreeMap::new());
        f.audit
            .log_data_access(AuditAction::Delete, "profile", None, None, None);
        f.audit
            .log_config_change("settings", json!({"old": 1}), json!({"new": 2}));
        f.audit
            .log_security(AuditAction::DataBreachAttempt, "rejected token", AuditSeverity::Critical);

        let events = f.audit.query(&AuditQuery::default());
        assert_eq!(events.len(), 4);

        let failed_login = events
            .iter()
            .find(|e| e.action == AuditAction::LoginFailed)
            .unwrap();
        assert_eq!(failed_login.severity, AuditSeverity::Medium);
        assert_eq!(failed_login.category, AuditCategory::Authentication);

        let config = events
            .iter()
            .find(|e| e.category == AuditCategory::Configuration)
            .unwrap();
        assert_eq!(config.severity, AuditSeverity::High);
        assert_eq!(config.old_value, Some(json!({"old": 1})));
    }

    #[test]
    fn test_client_context_is_stamped() {
        let f = fixture();
        f.audit.set_client_context(ClientContext {
            ip_address: Some("10.0.0.7".into()),
            user_agent: Some("avalia-cli/0.1".into()),
        });

        f.audit.log(AuditDraft::new(AuditAction::Login, "authentication"));
        let events = f.audit.query(&AuditQuery::default());

        assert_eq!(events[0].ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(events[0].user_agent.as_deref(), Some("avalia-cli/0.1"));
    }

    #[test]
    fn test_health_warns_on_nearly_full_buffer() {
        let f = fixture_with_threshold(10);
        for _ in 0..8 {
            f.audit.log(AuditDraft::new(AuditAction::Read, "reports"));
        }

        let report = f.audit.health_check();
        assert_eq!(report.status, avalia_common::HealthStatus::Warning);
    }

    // Full walkthrough: tenant creation, scoped writes across a switch,
    // derived classification, severity query.
    #[test]
    fn test_admin_portal_walkthrough() {
        let f = fixture();

        let mut request = NewTenant::named("acme", "Acme Corp");
        request.cnpj = Some("12345678000190".into());
        let acme = f.registry.create(request).unwrap();
        assert!(acme.is_active);

        f.registry.switch_active(&acme.id).unwrap();
        let scope = f.registry.current_scope();
        assert!(f.store.set(&scope, "profile", &json!({"name": "Bob"})));
        assert_eq!(
            f.store.get::<Value>(&scope, "profile"),
            Some(json!({"name": "Bob"}))
        );

        f.registry.switch_active(DEFAULT_TENANT_ID).unwrap();
        let scope = f.registry.current_scope();
        assert_eq!(f.store.get::<Value>(&scope, "profile"), None);

        f.audit.log(AuditDraft::new(AuditAction::Delete, "profile"));
        let high = f.audit.query(&AuditQuery {
            severity: Some(AuditSeverity::High),
            ..AuditQuery::default()
        });
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].category, AuditCategory::DataAccess);
        assert_eq!(high[0].resource, "profile");
    }
}
