// src/auth/jwt.rs
//
// Verification side of the platform's HS256 tokens. Issuance lives in the
// auth service; this service only checks the bearer token and the required
// permission, and feeds failed checks back into the event log.

use actix_service::{forward_ready, Service, Transform};
use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web, Error as ActixErr, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::services::events::{NewSecurityEvent, Severity};
use crate::services::monitor::SecurityMonitor;
use crate::state::AppState;

/// ---------------------------------------------------------------------
/// Permissions declared in the platform JWT
/// ---------------------------------------------------------------------
pub const LOG_EVENTS: &str = "log_events";
pub const VIEW_EVENTS: &str = "view_events";
pub const MANAGE_EVENTS: &str = "manage_events";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Platform username of the caller (service accounts included).
    pub sub: String,
    pub perms: Vec<String>,
    pub exp: usize,
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
pub fn sign(sub: &str, perms: Vec<String>, secret: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    let exp = (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs)).timestamp() as usize;
    let claims = Claims {
        sub: sub.to_string(),
        perms,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("jwt encode")
}

/// Extractor for handlers running behind `Requires`: the guard has already
/// verified the token and parked the claims in the request extensions.
pub struct Authenticated(pub Claims);

impl FromRequest for Authenticated {
    type Error = ActixErr;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Claims>()
                .cloned()
                .map(Authenticated)
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("missing credentials")),
        )
    }
}

/// ---------------------------------------------------------------------
/// Middleware Requires(permission)
/// ---------------------------------------------------------------------
#[derive(Clone)]
pub struct Requires(pub &'static str);

pub struct RequireGuard<S> {
    inner: Arc<S>,
    need: &'static str,
    secret: String,
}

impl<S> Transform<S, ServiceRequest> for Requires
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = ActixErr> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixErr;
    type InitError = ();
    type Transform = RequireGuard<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, srv: S) -> Self::Future {
        let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET");
        ready(Ok(RequireGuard {
            inner: Arc::new(srv),
            need: self.0,
            secret,
        }))
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Guard failures are themselves security signals; push them through the
/// engine's best-effort path.
async fn record_auth_event(
    monitor: Option<Arc<SecurityMonitor>>,
    event_type: &'static str,
    ip: String,
    user_agent: Option<String>,
    details: serde_json::Value,
) {
    let Some(monitor) = monitor else { return };
    let _ = web::block(move || {
        let event = NewSecurityEvent {
            ip_address: Some(ip),
            user_agent,
            ..NewSecurityEvent::meta(event_type, Severity::Medium, details)
        };
        if let Err(err) = monitor.log_event(event) {
            log::warn!("auth event not recorded: {err}");
        }
    })
    .await;
}

impl<S> Service<ServiceRequest> for RequireGuard<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = ActixErr> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixErr;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inner = self.inner.clone();
        let secret = self.secret.clone();
        let need = self.need;
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let monitor = req
            .app_data::<web::Data<AppState>>()
            .map(|d| d.monitor.clone());

        Box::pin(async move {
            let Some(token) = bearer_token(&req) else {
                record_auth_event(monitor, "missing_token", ip, user_agent, json!({})).await;
                return Ok(req.into_response(HttpResponse::Unauthorized().finish()));
            };

            let claims = match verify(&token, &secret) {
                Ok(claims) => claims,
                Err(_) => {
                    record_auth_event(monitor, "invalid_token", ip, user_agent, json!({})).await;
                    return Ok(req.into_response(HttpResponse::Unauthorized().finish()));
                }
            };

            if !claims.perms.iter().any(|p| p == need) {
                record_auth_event(
                    monitor,
                    "forbidden_access",
                    ip,
                    user_agent,
                    json!({ "required": need, "subject": claims.sub }),
                )
                .await;
                return Ok(req.into_response(HttpResponse::Forbidden().finish()));
            }

            req.extensions_mut().insert(claims);
            inner.call(req).await
        })
    }
}
