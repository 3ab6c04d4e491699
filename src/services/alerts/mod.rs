//! Alert artifacts and the delivery seam.
//!
//! Alerts are engine-produced, never caller-supplied. They are not a durable
//! table of their own: the reference dispatcher records each one as a
//! low-severity `security_alert_created` event, which keeps the audit trail
//! in the one store the service already has. Real transports are swapped in
//! behind `AlertDispatcher`.

pub mod webhook;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::services::events::{EventStore, NewSecurityEvent, Severity};

/// Audit-trail event type written by the reference dispatcher.
pub const SECURITY_ALERT_CREATED: &str = "security_alert_created";

#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    /// Triggering event; synthetic for pattern-scan alerts.
    pub event_id: Uuid,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub recipients: Vec<String>,
    pub sent_at: DateTime<Utc>,
    // Declared for the dashboard contract; no acknowledgement workflow
    // populates these yet.
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl SecurityAlert {
    pub fn new(
        event_id: Uuid,
        alert_type: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            alert_type: alert_type.into(),
            severity,
            message: message.into(),
            recipients,
            sent_at: Utc::now(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }
}

/// Delivery boundary. The engine never assumes delivery succeeded; failures
/// are logged and suppressed by the caller.
pub trait AlertDispatcher: Send + Sync {
    fn send(&self, alert: &SecurityAlert) -> Result<(), DispatchError>;
}

/// Reference behavior: persist the alert as an audit event and write a log
/// line. No external transport involved.
pub struct AuditLogDispatcher {
    store: Arc<dyn EventStore>,
}

impl AuditLogDispatcher {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

impl AlertDispatcher for AuditLogDispatcher {
    fn send(&self, alert: &SecurityAlert) -> Result<(), DispatchError> {
        log::warn!(
            "security alert {} ({}, {}): {} -> {}",
            alert.id,
            alert.alert_type,
            alert.severity,
            alert.message,
            alert.recipients.join(", ")
        );
        let details = serde_json::to_value(alert).unwrap_or_default();
        self.store
            .insert(NewSecurityEvent::meta(
                SECURITY_ALERT_CREATED,
                Severity::Low,
                details,
            ))
            .map(|_| ())
            .map_err(DispatchError::Audit)
    }
}
