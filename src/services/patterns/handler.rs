use actix_web::{post, web, HttpResponse};

use crate::auth::{Requires, MANAGE_EVENTS};
use crate::state::AppState;

#[post("")]
async fn run_scan(state: web::Data<AppState>) -> HttpResponse {
    let monitor = state.monitor.clone();
    match web::block(move || monitor.detect_suspicious_patterns()).await {
        Ok(Ok(outcome)) => HttpResponse::Ok().json(outcome),
        Ok(Err(err)) => err.to_response(),
        Err(_) => HttpResponse::InternalServerError().finish(),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/security/ops/scan")
            .wrap(Requires(MANAGE_EVENTS))
            .service(run_scan),
    );
}
