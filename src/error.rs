//! Error taxonomy for the monitoring service.
//!
//! Callers switch on the coarse kind; the original datastore failure stays
//! attached as `source()` so logs keep the root cause.

use thiserror::Error;
use uuid::Uuid;

/// Datastore I/O failure, cause preserved.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool exhausted")]
    Pool(#[source] diesel::r2d2::PoolError),
    #[error("query failed")]
    Query(#[from] diesel::result::Error),
}

/// Alert delivery failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to record alert audit event")]
    Audit(#[source] StoreError),
    #[error("webhook delivery failed")]
    Webhook(#[source] reqwest::Error),
}

/// What an API caller can see. One coarse kind per operation.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("security event {0} not found")]
    NotFound(Uuid),
    #[error("datastore operation failed")]
    Store(#[from] StoreError),
}

impl MonitorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MonitorError::Validation(msg.into())
    }
}

impl MonitorError {
    /// Maps the coarse kind to a response. Store failures keep their root
    /// cause in the service log only; the caller sees the stable kind.
    pub fn to_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;
        match self {
            MonitorError::Validation(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            MonitorError::NotFound(_) => {
                HttpResponse::NotFound().json(serde_json::json!({ "error": self.to_string() }))
            }
            MonitorError::Store(_) => {
                log::error!("{}", error_chain(self));
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "error": self.to_string() }))
            }
        }
    }
}

/// Renders an error with its full `source()` chain, for log lines.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(src) = cur {
        out.push_str(": ");
        out.push_str(&src.to_string());
        cur = src.source();
    }
    out
}
