//! Postgres-backed `EventStore` over the platform pool.

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use serde_json::json;
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::security_events;
use crate::state::DbPool;

use super::store::{EventStore, GroupKey};
use super::{
    EventAggregate, EventFilter, EventPage, NewSecurityEvent, Page, SecurityEvent, Severity,
    TypeCount,
};

type Conn = PooledConnection<ConnectionManager<PgConnection>>;

pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        self.pool.get().map_err(StoreError::Pool)
    }
}

/* -------------------------------------------------------------------------- */
/*                             dynamic filter query                           */
/* -------------------------------------------------------------------------- */

// Applied to both the page query and the count query, so the two can never
// drift apart.
macro_rules! apply_filter {
    ($query:expr, $filter:expr) => {{
        let mut q = $query;
        if let Some(sevs) = &$filter.severities {
            q = q.filter(security_events::severity.eq_any(sevs.clone()));
        }
        if let Some(types) = &$filter.event_types {
            q = q.filter(security_events::event_type.eq_any(types.clone()));
        }
        if let Some(uid) = $filter.user_id {
            q = q.filter(security_events::user_id.eq(uid));
        }
        if let Some(from) = $filter.from {
            q = q.filter(security_events::created_at.ge(from));
        }
        if let Some(to) = $filter.to {
            q = q.filter(security_events::created_at.le(to));
        }
        match $filter.resolved {
            Some(true) => q = q.filter(security_events::resolved_at.is_not_null()),
            Some(false) => q = q.filter(security_events::resolved_at.is_null()),
            None => {}
        }
        q
    }};
}

impl EventStore for PgEventStore {
    fn insert(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        let event = event.into_event();
        let mut conn = self.conn()?;
        diesel::insert_into(security_events::table)
            .values(&event)
            .get_result(&mut conn)
            .map_err(Into::into)
    }

    fn fetch(&self, id: Uuid) -> Result<Option<SecurityEvent>, StoreError> {
        let mut conn = self.conn()?;
        security_events::table
            .find(id)
            .first(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn search(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StoreError> {
        let mut conn = self.conn()?;

        let total: i64 =
            apply_filter!(security_events::table.select(count_star()).into_boxed(), filter)
                .get_result(&mut conn)?;

        let events = apply_filter!(security_events::table.into_boxed(), filter)
            .order(security_events::created_at.desc())
            .limit(page.per_page)
            .offset(page.offset())
            .load::<SecurityEvent>(&mut conn)?;

        Ok(EventPage { events, total })
    }

    fn count_since(&self, event_type: &str, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        security_events::table
            .filter(security_events::event_type.eq(event_type))
            .filter(security_events::created_at.ge(since))
            .count()
            .get_result(&mut conn)
            .map_err(Into::into)
    }

    fn grouped_counts(
        &self,
        event_type: &str,
        key: GroupKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn()?;
        let base = security_events::table
            .filter(security_events::event_type.eq(event_type))
            .filter(security_events::created_at.ge(since));

        match key {
            GroupKey::IpAddress => {
                let rows: Vec<(Option<String>, i64)> = base
                    .filter(security_events::ip_address.is_not_null())
                    .group_by(security_events::ip_address)
                    .select((security_events::ip_address, count_star()))
                    .load(&mut conn)?;
                Ok(rows
                    .into_iter()
                    .filter_map(|(k, c)| k.map(|k| (k, c)))
                    .collect())
            }
            GroupKey::UserId => {
                let rows: Vec<(Option<Uuid>, i64)> = base
                    .filter(security_events::user_id.is_not_null())
                    .group_by(security_events::user_id)
                    .select((security_events::user_id, count_star()))
                    .load(&mut conn)?;
                Ok(rows
                    .into_iter()
                    .filter_map(|(k, c)| k.map(|k| (k.to_string(), c)))
                    .collect())
            }
        }
    }

    fn mark_resolved(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolution: &str,
    ) -> Result<Option<SecurityEvent>, StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<Option<SecurityEvent>, diesel::result::Error, _>(|conn| {
            let existing: Option<SecurityEvent> = security_events::table
                .find(id)
                .first(conn)
                .optional()?;
            let Some(mut event) = existing else {
                return Ok(None);
            };

            if let Some(obj) = event.details.as_object_mut() {
                obj.insert("resolution".into(), json!(resolution));
            } else {
                event.details = json!({ "resolution": resolution });
            }

            diesel::update(security_events::table.find(id))
                .set((
                    security_events::resolved_at.eq(Utc::now()),
                    security_events::resolved_by.eq(resolved_by),
                    security_events::details.eq(&event.details),
                ))
                .get_result(conn)
                .map(Some)
        })
        .map_err(Into::into)
    }

    fn aggregate(&self, since: DateTime<Utc>) -> Result<EventAggregate, StoreError> {
        let mut conn = self.conn()?;

        let severity_rows: Vec<(Severity, i64)> = security_events::table
            .filter(security_events::created_at.ge(since))
            .group_by(security_events::severity)
            .select((security_events::severity, count_star()))
            .load(&mut conn)?;
        let mut by_severity: std::collections::HashMap<Severity, i64> =
            Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        for (sev, count) in severity_rows {
            by_severity.insert(sev, count);
        }

        let mut type_rows: Vec<(String, i64)> = security_events::table
            .filter(security_events::created_at.ge(since))
            .group_by(security_events::event_type)
            .select((security_events::event_type, count_star()))
            .load(&mut conn)?;
        // Cardinality here is the platform's event-type vocabulary, small
        // enough to rank in process.
        type_rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        type_rows.truncate(10);

        let recent = security_events::table
            .order(security_events::created_at.desc())
            .limit(20)
            .load::<SecurityEvent>(&mut conn)?;

        Ok(EventAggregate {
            by_severity,
            by_type: type_rows
                .into_iter()
                .map(|(event_type, count)| TypeCount { event_type, count })
                .collect(),
            recent,
        })
    }

    fn unresolved_critical(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        security_events::table
            .filter(security_events::severity.eq(Severity::Critical))
            .filter(security_events::resolved_at.is_null())
            .count()
            .get_result(&mut conn)
            .map_err(Into::into)
    }

    fn mean_resolution_minutes(&self, since: DateTime<Utc>) -> Result<Option<f64>, StoreError> {
        let mut conn = self.conn()?;
        let pairs: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = security_events::table
            .filter(security_events::created_at.ge(since))
            .filter(security_events::resolved_at.is_not_null())
            .filter(security_events::resolved_at.ge(since))
            .select((security_events::created_at, security_events::resolved_at))
            .load(&mut conn)?;

        let durations: Vec<f64> = pairs
            .into_iter()
            .filter_map(|(created, resolved)| {
                resolved.map(|r| (r - created).num_seconds() as f64 / 60.0)
            })
            .collect();
        if durations.is_empty() {
            return Ok(None);
        }
        Ok(Some(durations.iter().sum::<f64>() / durations.len() as f64))
    }
}
