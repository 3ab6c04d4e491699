//! Unconditional escalation for critical events.
//!
//! Independent of threshold counting: both mechanisms may fire for the same
//! event. The admin roster is re-read on every escalation so membership
//! changes apply immediately.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use crate::services::alerts::{AlertDispatcher, SecurityAlert};
use crate::services::events::{EventStore, NewSecurityEvent, SecurityEvent, Severity};
use crate::services::roster::RosterDirectory;

pub const CRITICAL_SECURITY_EVENT: &str = "critical_security_event";
/// Audit-trail event type for escalations.
pub const SECURITY_EVENT_ESCALATED: &str = "security_event_escalated";

pub struct EscalationPolicy {
    store: Arc<dyn EventStore>,
    critical_types: HashSet<String>,
    dispatcher: Arc<dyn AlertDispatcher>,
    roster: Arc<dyn RosterDirectory>,
}

impl EscalationPolicy {
    pub fn new(
        store: Arc<dyn EventStore>,
        critical_types: HashSet<String>,
        dispatcher: Arc<dyn AlertDispatcher>,
        roster: Arc<dyn RosterDirectory>,
    ) -> Self {
        Self {
            store,
            critical_types,
            dispatcher,
            roster,
        }
    }

    fn is_critical(&self, event: &SecurityEvent) -> bool {
        event.severity == Severity::Critical || self.critical_types.contains(&event.event_type)
    }

    pub fn evaluate(&self, event: &SecurityEvent) -> anyhow::Result<Option<SecurityAlert>> {
        if !self.is_critical(event) {
            return Ok(None);
        }

        let recipients = self.roster.active_admins().context("admin roster")?;
        let alert = SecurityAlert::new(
            event.id,
            CRITICAL_SECURITY_EVENT,
            Severity::Critical,
            format!(
                "critical security event: {} (id {}, severity {})",
                event.event_type, event.id, event.severity
            ),
            recipients,
        );
        self.dispatcher.send(&alert).context("alert dispatch")?;

        self.store
            .insert(NewSecurityEvent::meta(
                SECURITY_EVENT_ESCALATED,
                Severity::Low,
                json!({ "event_id": event.id, "event_type": event.event_type }),
            ))
            .context("escalation audit event")?;

        Ok(Some(alert))
    }
}
