use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{Authenticated, Requires, LOG_EVENTS, MANAGE_EVENTS, VIEW_EVENTS};
use crate::error::MonitorError;
use crate::state::AppState;

use super::{EventFilter, NewSecurityEvent, Page, Severity};

/* -------------------------------------------------------------------------- */
/*                                  ingestion                                 */
/* -------------------------------------------------------------------------- */

#[post("")]
async fn log_event(
    state: web::Data<AppState>,
    body: web::Json<NewSecurityEvent>,
) -> HttpResponse {
    let monitor = state.monitor.clone();
    match web::block(move || monitor.log_event(body.into_inner())).await {
        Ok(Ok(id)) => HttpResponse::Created().json(json!({ "id": id })),
        Ok(Err(err)) => err.to_response(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

/* -------------------------------------------------------------------------- */
/*                                  dashboard                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
struct EventQuery {
    /// Comma-separated severity names.
    severity: Option<String>,
    /// Comma-separated event types.
    event_type: Option<String>,
    user_id: Option<Uuid>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    resolved: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
}

impl EventQuery {
    fn into_parts(self) -> Result<(EventFilter, Page), MonitorError> {
        let severities = self
            .severity
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        Severity::parse(s).ok_or_else(|| {
                            MonitorError::validation(format!("unknown severity: {s:?}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        let event_types = self.event_type.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let filter = EventFilter {
            severities,
            event_types,
            user_id: self.user_id,
            from: self.from,
            to: self.to,
            resolved: self.resolved,
        };

        let defaults = Page::default();
        let page = Page {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        };
        Ok((filter, page))
    }
}

#[get("")]
async fn list_events(state: web::Data<AppState>, query: web::Query<EventQuery>) -> HttpResponse {
    let (filter, page) = match query.into_inner().into_parts() {
        Ok(parts) => parts,
        Err(err) => return err.to_response(),
    };
    let monitor = state.monitor.clone();
    match web::block(move || monitor.get_events(&filter, page)).await {
        Ok(Ok(page)) => HttpResponse::Ok().json(page),
        Ok(Err(err)) => err.to_response(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

/* -------------------------------------------------------------------------- */
/*                                 resolution                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
struct ResolveBody {
    #[serde(default)]
    note: Option<String>,
}

#[post("/{id}/resolve")]
async fn resolve_event(
    state: web::Data<AppState>,
    Authenticated(claims): Authenticated,
    id: web::Path<Uuid>,
    body: web::Json<ResolveBody>,
) -> HttpResponse {
    let monitor = state.monitor.clone();
    let id = id.into_inner();
    let note = body.into_inner().note;
    match web::block(move || monitor.resolve_event(id, &claims.sub, note.as_deref())).await {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({ "resolved": id })),
        Ok(Err(err)) => err.to_response(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

/* -------------------------------------------------------------------------- */

pub fn ingest(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security/events")
            .wrap(Requires(LOG_EVENTS))
            .service(log_event),
    );
}

pub fn dashboard(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security/dashboard/events")
            .wrap(Requires(VIEW_EVENTS))
            .service(list_events),
    );
}

pub fn ops(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security/ops/events")
            .wrap(Requires(MANAGE_EVENTS))
            .service(resolve_event),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_lists_and_paging() {
        let query = EventQuery {
            severity: Some("high, critical".into()),
            event_type: Some("failed_login,data_breach".into()),
            user_id: None,
            from: None,
            to: None,
            resolved: Some(false),
            page: Some(2),
            per_page: Some(25),
        };
        let (filter, page) = query.into_parts().unwrap();
        assert_eq!(
            filter.severities,
            Some(vec![Severity::High, Severity::Critical])
        );
        assert_eq!(
            filter.event_types,
            Some(vec!["failed_login".to_string(), "data_breach".to_string()])
        );
        assert_eq!(filter.resolved, Some(false));
        assert_eq!(page.page, 2);
        assert_eq!(page.offset(), 25);
    }

    #[test]
    fn unknown_severity_is_a_validation_error() {
        let query = EventQuery {
            severity: Some("fatal".into()),
            event_type: None,
            user_id: None,
            from: None,
            to: None,
            resolved: None,
            page: None,
            per_page: None,
        };
        assert!(matches!(
            query.into_parts(),
            Err(MonitorError::Validation(_))
        ));
    }
}
