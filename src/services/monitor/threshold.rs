//! Sliding-window threshold evaluation.
//!
//! The count is re-derived from the store on every matching event instead of
//! keeping streaming counters. A sustained burst above the ceiling therefore
//! re-fires the alert on every subsequent qualifying event.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use crate::config::ThresholdRule;
use crate::services::alerts::{AlertDispatcher, SecurityAlert};
use crate::services::events::{EventStore, SecurityEvent};
use crate::services::roster::RosterDirectory;

pub struct ThresholdEngine {
    store: Arc<dyn EventStore>,
    rules: HashMap<String, ThresholdRule>,
    dispatcher: Arc<dyn AlertDispatcher>,
    roster: Arc<dyn RosterDirectory>,
}

impl ThresholdEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        rules: HashMap<String, ThresholdRule>,
        dispatcher: Arc<dyn AlertDispatcher>,
        roster: Arc<dyn RosterDirectory>,
    ) -> Self {
        Self {
            store,
            rules,
            dispatcher,
            roster,
        }
    }

    /// Counts same-type events inside the rule's trailing window (the freshly
    /// persisted event included) and alerts once the ceiling is reached.
    pub fn evaluate(&self, event: &SecurityEvent) -> anyhow::Result<Option<SecurityAlert>> {
        let Some(rule) = self.rules.get(&event.event_type) else {
            return Ok(None);
        };

        let window_start = Utc::now() - rule.window;
        let count = self
            .store
            .count_since(&event.event_type, window_start)
            .context("window count")?;
        if count < rule.max_count {
            return Ok(None);
        }

        let recipients = self
            .roster
            .security_team()
            .context("security team roster")?;
        let alert = SecurityAlert::new(
            event.id,
            format!("threshold_exceeded_{}", event.event_type),
            event.severity,
            format!(
                "{count} {} events in the last {}s (ceiling {})",
                event.event_type,
                rule.window.num_seconds(),
                rule.max_count
            ),
            recipients,
        );
        self.dispatcher.send(&alert).context("alert dispatch")?;
        Ok(Some(alert))
    }
}
