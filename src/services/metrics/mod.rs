//! Read-only rollups for the operations dashboard.

pub mod handler;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::services::events::{EventStore, SecurityEvent, Severity, TypeCount};

/// Reporting window for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsRange {
    Day,
    Week,
    Month,
}

impl MetricsRange {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(MetricsRange::Day),
            "week" => Some(MetricsRange::Week),
            "month" => Some(MetricsRange::Month),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsRange::Day => "day",
            MetricsRange::Week => "week",
            MetricsRange::Month => "month",
        }
    }

    fn duration(&self) -> Duration {
        match self {
            MetricsRange::Day => Duration::days(1),
            MetricsRange::Week => Duration::weeks(1),
            MetricsRange::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SecurityMetrics {
    pub time_range: &'static str,
    pub total_events: i64,
    pub events_by_severity: HashMap<Severity, i64>,
    pub top_event_types: Vec<TypeCount>,
    /// Newest 20 events overall, not bounded by the range.
    pub recent_events: Vec<SecurityEvent>,
    /// Open critical events across the whole log.
    pub unresolved_critical: i64,
    /// Mean time-to-resolution over events both created and resolved inside
    /// the range; absent when nothing was resolved in it.
    pub avg_resolution_minutes: Option<f64>,
}

pub struct MetricsAggregator {
    store: Arc<dyn EventStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn collect(&self, range: MetricsRange) -> Result<SecurityMetrics, StoreError> {
        let since = Utc::now() - range.duration();
        let aggregate = self.store.aggregate(since)?;
        let total_events = aggregate.by_severity.values().sum();

        Ok(SecurityMetrics {
            time_range: range.as_str(),
            total_events,
            events_by_severity: aggregate.by_severity,
            top_event_types: aggregate.by_type,
            recent_events: aggregate.recent,
            unresolved_critical: self.store.unresolved_critical()?,
            avg_resolution_minutes: self.store.mean_resolution_minutes(since)?,
        })
    }
}
