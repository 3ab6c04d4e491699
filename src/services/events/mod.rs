//! Security events: the unit of record for the monitoring engine.

pub mod db;
pub mod handler;
#[cfg(test)]
pub mod memory;
pub mod store;

use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MonitorError;

pub use store::{EventStore, GroupKey};

/// Closed severity scale, ordered by urgency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for Severity {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for Severity {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        let s = std::str::from_utf8(value.as_bytes())?;
        Severity::parse(s).ok_or_else(|| format!("unrecognized severity: {s}").into())
    }
}

/// One security-relevant occurrence. Immutable after insert, except for the
/// single open → resolved transition.
#[derive(Debug, Clone, Serialize, Deserialize, diesel::Queryable, diesel::Insertable)]
#[diesel(table_name = crate::schema::security_events)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: String,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl SecurityEvent {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

fn empty_details() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Producer-supplied payload for `log_event`. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSecurityEvent {
    pub event_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "empty_details")]
    pub details: serde_json::Value,
}

impl NewSecurityEvent {
    /// Engine-internal audit record (escalation, resolution, alert trail).
    pub fn meta(event_type: &str, severity: Severity, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            severity,
            user_id: None,
            resource_type: None,
            resource_id: None,
            ip_address: None,
            user_agent: None,
            details,
        }
    }

    pub(crate) fn into_event(self) -> SecurityEvent {
        SecurityEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            severity: self.severity,
            user_id: self.user_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            details: self.details,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }
}

static EVENT_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_.:-]{0,99}$").expect("event type regex"));

/// Event types are producer-defined but must stay greppable: lowercase,
/// namespaced with `_`, `.`, `:` or `-`.
pub fn validate_event_type(event_type: &str) -> Result<(), MonitorError> {
    if EVENT_TYPE_RE.is_match(event_type) {
        Ok(())
    } else {
        Err(MonitorError::validation(format!(
            "malformed event type: {event_type:?}"
        )))
    }
}

/// Query filter for `get_events`. Every field is optional; absent means
/// "do not constrain".
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub severities: Option<Vec<Severity>>,
    pub event_types: Option<Vec<String>>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub resolved: Option<bool>,
}

impl EventFilter {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(MonitorError::validation("date range start is after end"));
            }
        }
        Ok(())
    }

    /// In-memory predicate, mirrors the SQL the Postgres store generates.
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(sevs) = &self.severities {
            if !sevs.contains(&event.severity) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }
        if let Some(uid) = self.user_id {
            if event.user_id != Some(uid) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.created_at > to {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if event.is_resolved() != resolved {
                return false;
            }
        }
        true
    }
}

pub const MAX_PER_PAGE: i64 = 200;

/// 1-based pagination.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Page {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.page < 1 {
            return Err(MonitorError::validation("page must be >= 1"));
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            return Err(MonitorError::validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// `search` result: one page of events plus the match count before paging.
#[derive(Debug, Serialize)]
pub struct EventPage {
    pub events: Vec<SecurityEvent>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeCount {
    pub event_type: String,
    pub count: i64,
}

/// Time-bounded rollup used by the metrics endpoint. `recent` is the newest
/// slice of the whole log, not range-scoped.
#[derive(Debug, Serialize)]
pub struct EventAggregate {
    pub by_severity: HashMap<Severity, i64>,
    pub by_type: Vec<TypeCount>,
    pub recent: Vec<SecurityEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(event_type: &str, severity: Severity) -> SecurityEvent {
        NewSecurityEvent::meta(event_type, severity, empty_details()).into_event()
    }

    #[test]
    fn severity_round_trips_as_text() {
        for sev in Severity::ALL {
            assert_eq!(Severity::parse(sev.as_str()), Some(sev));
        }
        assert_eq!(Severity::parse("fatal"), None);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn event_type_shape_is_enforced() {
        assert!(validate_event_type("failed_login").is_ok());
        assert!(validate_event_type("auth:login.failed").is_ok());
        assert!(validate_event_type("").is_err());
        assert!(validate_event_type("Shouting").is_err());
        assert!(validate_event_type("spaced out").is_err());
    }

    #[test]
    fn filter_matches_mirror_sql_semantics() {
        let mut event = sample("failed_login", Severity::Medium);
        event.ip_address = Some("203.0.113.5".into());

        let mut filter = EventFilter {
            severities: Some(vec![Severity::Medium, Severity::High]),
            event_types: Some(vec!["failed_login".into()]),
            resolved: Some(false),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        filter.resolved = Some(true);
        assert!(!filter.matches(&event));

        filter.resolved = None;
        filter.from = Some(event.created_at + Duration::seconds(1));
        assert!(!filter.matches(&event));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let now = Utc::now();
        let filter = EventFilter {
            from: Some(now),
            to: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(
            filter.validate(),
            Err(MonitorError::Validation(_))
        ));
    }
}
