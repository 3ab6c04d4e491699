use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use crate::auth::{Requires, VIEW_EVENTS};
use crate::error::MonitorError;
use crate::state::AppState;

use super::MetricsRange;

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    range: Option<String>,
}

#[get("")]
async fn security_metrics(
    state: web::Data<AppState>,
    query: web::Query<MetricsQuery>,
) -> HttpResponse {
    let raw = query.into_inner().range.unwrap_or_else(|| "day".into());
    let Some(range) = MetricsRange::parse(&raw) else {
        return MonitorError::validation(format!(
            "unknown range {raw:?}, expected day, week or month"
        ))
        .to_response();
    };

    let monitor = state.monitor.clone();
    match web::block(move || monitor.security_metrics(range)).await {
        Ok(Ok(metrics)) => HttpResponse::Ok().json(metrics),
        Ok(Err(err)) => err.to_response(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security/dashboard/metrics")
            .wrap(Requires(VIEW_EVENTS))
            .service(security_metrics),
    );
}
