//! In-memory `EventStore` for the engine tests. Single `Mutex<Vec<_>>`,
//! linear scans: tests never hold enough events for that to matter.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::StoreError;

use super::store::{EventStore, GroupKey};
use super::{
    EventAggregate, EventFilter, EventPage, NewSecurityEvent, Page, SecurityEvent, Severity,
    TypeCount,
};

#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully-formed event, timestamps included. Lets tests place
    /// events at exact points in the window.
    pub fn seed(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventStore for MemoryEventStore {
    fn insert(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        let event = event.into_event();
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    fn fetch(&self, id: Uuid) -> Result<Option<SecurityEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    fn search(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StoreError> {
        let events = self.events.lock().unwrap();
        let mut matches: Vec<SecurityEvent> =
            events.iter().filter(|e| filter.matches(e)).cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matches.len() as i64;
        let events = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Ok(EventPage { events, total })
    }

    fn count_since(&self, event_type: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type && e.created_at >= since)
            .count() as i64)
    }

    fn grouped_counts(
        &self,
        event_type: &str,
        key: GroupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let events = self.events.lock().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| e.event_type == event_type && e.created_at >= since)
        {
            let group = match key {
                GroupKey::IpAddress => event.ip_address.clone(),
                GroupKey::UserId => event.user_id.map(|u| u.to_string()),
            };
            if let Some(group) = group {
                *counts.entry(group).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    fn mark_resolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolution: &str,
    ) -> Result<Option<SecurityEvent>, StoreError> {
        let mut events = self.events.lock().unwrap();
        let Some(event) = events.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        event.resolved_at = Some(Utc::now());
        event.resolved_by = Some(resolved_by.to_string());
        if let Some(obj) = event.details.as_object_mut() {
            obj.insert("resolution".into(), json!(resolution));
        } else {
            event.details = json!({ "resolution": resolution });
        }
        Ok(Some(event.clone()))
    }

    fn aggregate(&self, since: DateTime<Utc>) -> Result<EventAggregate, StoreError> {
        let events = self.events.lock().unwrap();

        let mut by_severity: HashMap<Severity, i64> =
            Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut by_type: HashMap<String, i64> = HashMap::new();
        for event in events.iter().filter(|e| e.created_at >= since) {
            *by_severity.entry(event.severity).or_insert(0) += 1;
            *by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        let mut by_type: Vec<(String, i64)> = by_type.into_iter().collect();
        by_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        by_type.truncate(10);

        let mut recent: Vec<SecurityEvent> = events.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(20);

        Ok(EventAggregate {
            by_severity,
            by_type: by_type
                .into_iter()
                .map(|(event_type, count)| TypeCount { event_type, count })
                .collect(),
            recent,
        })
    }

    fn unresolved_critical(&self) -> Result<i64, StoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.severity == Severity::Critical && !e.is_resolved())
            .count() as i64)
    }

    fn mean_resolution_minutes(&self, since: DateTime<Utc>) -> Result<Option<f64>, StoreError> {
        let events = self.events.lock().unwrap();
        let durations: Vec<f64> = events
            .iter()
            .filter(|e| e.created_at >= since)
            .filter_map(|e| e.resolved_at.filter(|r| *r >= since).map(|r| (r, e.created_at)))
            .map(|(resolved, created)| (resolved - created).num_seconds() as f64 / 60.0)
            .collect();
        if durations.is_empty() {
            return Ok(None);
        }
        Ok(Some(durations.iter().sum::<f64>() / durations.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn log(store: &MemoryEventStore, event_type: &str, severity: Severity) -> SecurityEvent {
        store
            .insert(NewSecurityEvent::meta(event_type, severity, json!({})))
            .unwrap()
    }

    #[test]
    fn logged_events_come_back_once_with_fields_intact() {
        let store = MemoryEventStore::new();
        let details = json!({ "nested": { "path": "/models/a.step", "attempts": [1, 2] } });
        let event = store
            .insert(NewSecurityEvent {
                event_type: "file_access_violation".into(),
                severity: Severity::High,
                user_id: Some(Uuid::new_v4()),
                resource_type: Some("cad_file".into()),
                resource_id: Some("42".into()),
                ip_address: Some("198.51.100.7".into()),
                user_agent: Some("platform-web/2.4".into()),
                details: details.clone(),
            })
            .unwrap();

        let page = store
            .search(&EventFilter::default(), Page::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.events.len(), 1);
        let got = &page.events[0];
        assert_eq!(got.id, event.id);
        assert_eq!(got.details, details);
        assert_eq!(got.ip_address.as_deref(), Some("198.51.100.7"));
        assert!(got.resolved_at.is_none());
    }

    #[test]
    fn empty_details_round_trip() {
        let store = MemoryEventStore::new();
        let event = log(&store, "failed_login", Severity::Low);
        let got = store.fetch(event.id).unwrap().unwrap();
        assert_eq!(got.details, json!({}));
    }

    #[test]
    fn search_is_newest_first_and_total_ignores_paging() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        for i in 0..5 {
            let mut e =
                NewSecurityEvent::meta("failed_login", Severity::Low, json!({})).into_event();
            e.created_at = now - Duration::minutes(i);
            store.seed(e);
        }
        let page = store
            .search(
                &EventFilter::default(),
                Page {
                    page: 1,
                    per_page: 2,
                },
            )
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.events.len(), 2);
        assert!(page.events[0].created_at > page.events[1].created_at);
    }

    #[test]
    fn count_since_honors_window_start() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        let mut old = NewSecurityEvent::meta("failed_login", Severity::Low, json!({})).into_event();
        old.created_at = now - Duration::minutes(30);
        store.seed(old);
        log(&store, "failed_login", Severity::Low);

        let count = store
            .count_since("failed_login", now - Duration::minutes(15))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn mark_resolved_merges_note_and_is_last_write_wins() {
        let store = MemoryEventStore::new();
        let event = store
            .insert(NewSecurityEvent {
                details: json!({ "origin": "scanner" }),
                ..NewSecurityEvent::meta("suspicious_activity", Severity::Medium, json!({}))
            })
            .unwrap();

        let resolved = store
            .mark_resolved(event.id, "alice", "false positive")
            .unwrap()
            .unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some("alice"));
        assert_eq!(resolved.details["origin"], json!("scanner"));
        assert_eq!(resolved.details["resolution"], json!("false positive"));

        let again = store
            .mark_resolved(event.id, "bob", "confirmed benign")
            .unwrap()
            .unwrap();
        assert_eq!(again.resolved_by.as_deref(), Some("bob"));
        assert_eq!(again.details["resolution"], json!("confirmed benign"));
    }

    #[test]
    fn mark_resolved_unknown_id_is_none() {
        let store = MemoryEventStore::new();
        assert!(store
            .mark_resolved(Uuid::new_v4(), "alice", "n/a")
            .unwrap()
            .is_none());
    }
}
