//! The monitoring engine facade.
//!
//! `SecurityMonitor` owns the ingestion pipeline: persist first, then run the
//! reactive side (threshold counting, escalation, alert dispatch) behind an
//! isolation boundary. A failure on the reactive side is logged and
//! suppressed; it can never turn a successful event write into a caller-visible
//! error.

pub mod escalation;
pub mod threshold;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::config::MonitorRules;
use crate::error::{error_chain, MonitorError};
use crate::services::alerts::AlertDispatcher;
use crate::services::events::{
    validate_event_type, EventFilter, EventPage, EventStore, NewSecurityEvent, Page, SecurityEvent,
    Severity,
};
use crate::services::metrics::{MetricsAggregator, MetricsRange, SecurityMetrics};
use crate::services::patterns::{PatternDetector, ScanOutcome};
use crate::services::roster::RosterDirectory;

use escalation::EscalationPolicy;
use threshold::ThresholdEngine;

/// Audit-trail event type for closures.
pub const SECURITY_EVENT_RESOLVED: &str = "security_event_resolved";

pub struct SecurityMonitor {
    store: Arc<dyn EventStore>,
    threshold: ThresholdEngine,
    escalation: EscalationPolicy,
    patterns: PatternDetector,
    metrics: MetricsAggregator,
}

impl SecurityMonitor {
    pub fn new(
        store: Arc<dyn EventStore>,
        rules: MonitorRules,
        dispatcher: Arc<dyn AlertDispatcher>,
        roster: Arc<dyn RosterDirectory>,
    ) -> Self {
        Self {
            threshold: ThresholdEngine::new(
                store.clone(),
                rules.thresholds,
                dispatcher.clone(),
                roster.clone(),
            ),
            escalation: EscalationPolicy::new(
                store.clone(),
                rules.critical_types,
                dispatcher.clone(),
                roster.clone(),
            ),
            patterns: PatternDetector::new(store.clone(), dispatcher, roster),
            metrics: MetricsAggregator::new(store.clone()),
            store,
        }
    }

    /// Persists the event, then evaluates thresholds and escalation
    /// best-effort. Only the persistence failure reaches the caller.
    pub fn log_event(&self, event: NewSecurityEvent) -> Result<Uuid, MonitorError> {
        validate_event_type(&event.event_type)?;
        let event = self.store.insert(event)?;
        self.react(&event);
        Ok(event.id)
    }

    fn react(&self, event: &SecurityEvent) {
        if let Err(err) = self.threshold.evaluate(event) {
            log::warn!(
                "threshold evaluation failed for event {}: {err:#}",
                event.id
            );
        }
        if let Err(err) = self.escalation.evaluate(event) {
            log::warn!("escalation failed for event {}: {err:#}", event.id);
        }
    }

    pub fn get_events(&self, filter: &EventFilter, page: Page) -> Result<EventPage, MonitorError> {
        filter.validate()?;
        page.validate()?;
        Ok(self.store.search(filter, page)?)
    }

    /// Closes an open event: terminal transition, no reopen. Re-resolving is
    /// allowed, last write wins.
    pub fn resolve_event(
        &self,
        id: Uuid,
        resolved_by: &str,
        note: Option<&str>,
    ) -> Result<(), MonitorError> {
        let note = note.unwrap_or("Resolved by administrator");
        self.store
            .mark_resolved(id, resolved_by, note)?
            .ok_or(MonitorError::NotFound(id))?;

        let audit = NewSecurityEvent::meta(
            SECURITY_EVENT_RESOLVED,
            Severity::Low,
            json!({ "event_id": id, "resolved_by": resolved_by }),
        );
        if let Err(err) = self.store.insert(audit) {
            log::warn!(
                "resolution audit event for {id} not recorded: {}",
                error_chain(&err)
            );
        }
        Ok(())
    }

    pub fn security_metrics(&self, range: MetricsRange) -> Result<SecurityMetrics, MonitorError> {
        Ok(self.metrics.collect(range)?)
    }

    pub fn detect_suspicious_patterns(&self) -> Result<ScanOutcome, MonitorError> {
        self.patterns.detect()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{monitor_with, FailingDispatcher, RecordingDispatcher, StaticRoster};
    use super::*;
    use crate::services::events::memory::MemoryEventStore;

    fn new_event(event_type: &str, severity: Severity) -> NewSecurityEvent {
        NewSecurityEvent::meta(event_type, severity, json!({}))
    }

    #[test]
    fn log_event_returns_id_and_persists() {
        let (monitor, store, _) = monitor_with(Arc::new(RecordingDispatcher::default()));
        let id = monitor
            .log_event(new_event("model_uploaded", Severity::Low))
            .unwrap();
        assert_eq!(store.fetch(id).unwrap().unwrap().event_type, "model_uploaded");
    }

    #[test]
    fn malformed_event_type_is_rejected_before_persist() {
        let (monitor, store, _) = monitor_with(Arc::new(RecordingDispatcher::default()));
        let err = monitor
            .log_event(new_event("Not An Event", Severity::Low))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn dispatch_failure_never_fails_the_write() {
        // data_breach escalates unconditionally; the dispatcher is broken.
        let store = Arc::new(MemoryEventStore::new());
        let monitor = SecurityMonitor::new(
            store.clone(),
            MonitorRules::default(),
            Arc::new(FailingDispatcher),
            Arc::new(StaticRoster::default()),
        );
        let id = monitor
            .log_event(new_event("data_breach", Severity::High))
            .unwrap();
        assert!(store.fetch(id).unwrap().is_some());
    }

    #[test]
    fn resolve_event_writes_audit_trail() {
        let (monitor, store, _) = monitor_with(Arc::new(RecordingDispatcher::default()));
        let id = monitor
            .log_event(new_event("suspicious_activity", Severity::Medium))
            .unwrap();

        monitor.resolve_event(id, "alice", Some("reviewed")).unwrap();

        let event = store.fetch(id).unwrap().unwrap();
        assert!(event.resolved_at.is_some());
        assert_eq!(event.resolved_by.as_deref(), Some("alice"));
        assert_eq!(event.details["resolution"], json!("reviewed"));

        let audit = store
            .snapshot()
            .into_iter()
            .find(|e| e.event_type == SECURITY_EVENT_RESOLVED)
            .expect("audit event");
        assert_eq!(audit.severity, Severity::Low);
        assert_eq!(audit.details["event_id"], json!(id));
        assert_eq!(audit.details["resolved_by"], json!("alice"));
    }

    #[test]
    fn resolve_event_unknown_id_is_not_found() {
        let (monitor, _, _) = monitor_with(Arc::new(RecordingDispatcher::default()));
        let missing = Uuid::new_v4();
        assert!(matches!(
            monitor.resolve_event(missing, "alice", None),
            Err(MonitorError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn resolve_event_default_note_applies() {
        let (monitor, store, _) = monitor_with(Arc::new(RecordingDispatcher::default()));
        let id = monitor
            .log_event(new_event("failed_login", Severity::Low))
            .unwrap();
        monitor.resolve_event(id, "bob", None).unwrap();
        let event = store.fetch(id).unwrap().unwrap();
        assert_eq!(event.details["resolution"], json!("Resolved by administrator"));
    }
}
