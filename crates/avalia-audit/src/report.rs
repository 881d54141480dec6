//! Trail Aggregation & Export

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::event::{AuditEvent, AuditSeverity};
use crate::log::{AuditLog, AuditQuery};

/// Window queries run over during aggregation.
const STATISTICS_SCAN_LIMIT: usize = 10_000;
/// Export ceiling; everything a tenant can hold fits well under it.
const EXPORT_SCAN_LIMIT: usize = 50_000;

/// Aggregated view of a tenant's trail over a day window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_events: usize,
    /// Event count per action wire name
    pub events_by_action: BTreeMap<String, u64>,
    /// Event count per category wire name
    pub events_by_category: BTreeMap<String, u64>,
    /// Event count per severity; every severity is present
    pub events_by_severity: BTreeMap<String, u64>,
    /// Ten busiest users, descending
    pub top_users: Vec<UserActivity>,
    /// Ten most recent events (last 24 hours)
    pub recent_activity: Vec<AuditEvent>,
    /// Up to five critical events from the last 7 days
    pub critical_alerts: Vec<AuditEvent>,
}

/// Per-user event count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub count: u64,
    /// Display name, when an event carried it
    pub name: Option<String>,
}

/// Trail serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl AuditLog {
    /// Aggregate the active tenant's trail over the last `days` days.
    pub fn statistics(&self, days: i64) -> AuditStatistics {
        let events = self.query(&AuditQuery {
            start_date: Some(self.clock().now() - Duration::days(days)),
            limit: Some(STATISTICS_SCAN_LIMIT),
            ..AuditQuery::default()
        });

        let mut by_action: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_category: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, u64> = AuditSeverity::all()
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_user: BTreeMap<String, UserActivity> = BTreeMap::new();

        for event in &events {
            *by_action.entry(event.action.as_str().into()).or_default() += 1;
            *by_category
                .entry(event.category.as_str().into())
                .or_default() += 1;
            *by_severity
                .entry(event.severity.as_str().into())
                .or_default() += 1;

            let activity = by_user
                .entry(event.user_id.clone())
                .or_insert_with(|| UserActivity {
                    user_id: event.user_id.clone(),
                    count: 0,
                    name: None,
                });
            activity.count += 1;
            if activity.name.is_none() {
                activity.name = event
                    .metadata
                    .get("user_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
        }

        let mut top_users: Vec<UserActivity> = by_user.into_values().collect();
        top_users.sort_by(|a, b| b.count.cmp(&a.count));
        top_users.truncate(10);

        AuditStatistics {
            total_events: events.len(),
            events_by_action: by_action,
            events_by_category: by_category,
            events_by_severity: by_severity,
            top_users,
            recent_activity: self.recent_activity(10),
            critical_alerts: self.critical_alerts(5),
        }
    }

    /// Serialize the matching part of the trail. JSON is a pretty-printed
    /// event array; CSV has a fixed column set with ISO-8601 timestamps.
    pub fn export(&self, query: &AuditQuery, format: ExportFormat) -> String {
        let events = self.query(&AuditQuery {
            limit: Some(EXPORT_SCAN_LIMIT),
            ..query.clone()
        });

        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&events).unwrap_or_default(),
            ExportFormat::Csv => to_csv(&events),
        }
    }
}

const CSV_HEADERS: [&str; 11] = [
    "ID",
    "Tenant ID",
    "User ID",
    "Action",
    "Resource",
    "Resource ID",
    "Timestamp",
    "IP Address",
    "Severity",
    "Category",
    "Description",
];

fn to_csv(events: &[AuditEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let mut rows = Vec::with_capacity(events.len() + 1);
    rows.push(CSV_HEADERS.map(csv_cell).join(","));

    for event in events {
        let description = event
            .metadata
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let timestamp = event.timestamp.to_rfc3339();
        let row = [
            event.id.as_str(),
            event.tenant_id.as_str(),
            event.user_id.as_str(),
            event.action.as_str(),
            event.resource.as_str(),
            event.resource_id.as_deref().unwrap_or(""),
            timestamp.as_str(),
            event.ip_address.as_deref().unwrap_or(""),
            event.severity.as_str(),
            event.category.as_str(),
            description,
        ];
        rows.push(row.map(csv_cell).join(","));
    }

    rows.join("\n")
}

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
