//! Per-IP request ceiling. Over-limit traffic gets 429 and a
//! `suspicious_activity` event, which makes the limiter a producer for the
//! engine's own 5-in-300s threshold rule.

use actix_service::{forward_ready, Service, Transform};
use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web, Error, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::services::events::{NewSecurityEvent, Severity};
use crate::state::AppState;

const MAX_REQ_PER_MIN: u32 = 100;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// (count, window reset time) per source IP.
type Counters = Arc<Mutex<HashMap<String, (u32, u64)>>>;

/// Clone shares the counter map, so every worker sees the same budget.
#[derive(Default, Clone)]
pub struct IpLimiter {
    counters: Counters,
}

pub struct Inner<S> {
    srv: Arc<S>,
    counters: Counters,
}

impl<S> Transform<S, ServiceRequest> for IpLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = Inner<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, srv: S) -> Self::Future {
        ready(Ok(Inner {
            srv: Arc::new(srv),
            counters: self.counters.clone(),
        }))
    }
}

impl<S> Service<ServiceRequest> for Inner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(srv);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        let should_block = {
            let mut map = self.counters.lock().unwrap();
            let entry = map.entry(ip.clone()).or_insert((0, now() + 60));
            if now() > entry.1 {
                *entry = (0, now() + 60);
            }
            entry.0 += 1;
            entry.0 > MAX_REQ_PER_MIN
        };

        if should_block {
            let monitor = req
                .app_data::<web::Data<AppState>>()
                .map(|d| d.monitor.clone());

            Box::pin(async move {
                if let Some(monitor) = monitor {
                    let _ = web::block(move || {
                        let event = NewSecurityEvent {
                            ip_address: Some(ip),
                            ..NewSecurityEvent::meta(
                                "suspicious_activity",
                                Severity::Medium,
                                json!({ "reason": "rate_limit", "limit_per_min": MAX_REQ_PER_MIN }),
                            )
                        };
                        if let Err(err) = monitor.log_event(event) {
                            log::warn!("rate-limit event not recorded: {err}");
                        }
                    })
                    .await;
                }
                Ok(req.into_response(HttpResponse::TooManyRequests().finish()))
            })
        } else {
            let srv = self.srv.clone();
            Box::pin(async move { srv.call(req).await })
        }
    }
}
