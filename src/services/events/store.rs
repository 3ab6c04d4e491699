//! Storage seam for the engine. The Postgres impl backs the service; the
//! in-memory impl backs the engine tests and local development.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

use super::{EventAggregate, EventFilter, EventPage, NewSecurityEvent, Page, SecurityEvent};

/// Grouping key for behavioral scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    IpAddress,
    UserId,
}

pub trait EventStore: Send + Sync {
    /// Assigns id and creation timestamp, writes the row.
    fn insert(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError>;

    fn fetch(&self, id: Uuid) -> Result<Option<SecurityEvent>, StoreError>;

    /// Filtered, newest-first, paginated. `total` counts all matches, not the
    /// returned page.
    fn search(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StoreError>;

    /// Events of `event_type` with `created_at >= since`.
    fn count_since(&self, event_type: &str, since: DateTime<Utc>) -> Result<i64, StoreError>;

    /// Per-key counts of `event_type` since `since`; rows with a null key are
    /// skipped.
    fn grouped_counts(
        &self,
        event_type: &str,
        key: GroupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Sets the resolution fields and merges the note into `details`.
    /// `None` when the id does not exist. Last write wins on re-resolution.
    fn mark_resolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolution: &str,
    ) -> Result<Option<SecurityEvent>, StoreError>;

    fn aggregate(&self, since: DateTime<Utc>) -> Result<EventAggregate, StoreError>;

    /// Open critical events, whole log (not range-scoped).
    fn unresolved_critical(&self) -> Result<i64, StoreError>;

    /// Mean time-to-resolution over events both created and resolved after
    /// `since`; `None` when no event qualifies.
    fn mean_resolution_minutes(&self, since: DateTime<Utc>) -> Result<Option<f64>, StoreError>;
}
