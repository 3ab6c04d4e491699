//! Behavioral pattern scans over the event log.
//!
//! Stateless: every invocation re-scans its windows from scratch, so a burst
//! still inside its window is re-flagged by repeated scans. The two
//! heuristics are isolated from each other; one failing must not drop the
//! other's results.

pub mod handler;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{error_chain, MonitorError, StoreError};
use crate::services::alerts::{AlertDispatcher, SecurityAlert};
use crate::services::events::{EventStore, GroupKey, Severity};
use crate::services::roster::RosterDirectory;

pub const REPEATED_FAILED_LOGINS: &str = "repeated_failed_logins";
pub const UNUSUAL_FILE_ACCESS: &str = "unusual_file_access";

const FAILED_LOGIN_WINDOW_MINUTES: i64 = 15;
const FAILED_LOGIN_CEILING: i64 = 5;
const FILE_ACCESS_WINDOW_HOURS: i64 = 1;
const FILE_ACCESS_CEILING: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousPattern {
    #[serde(rename = "type")]
    pub pattern_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub count: i64,
    pub severity: Severity,
    /// Start of the scanned window; downstream consumers can use it as a
    /// dedup bucket across repeated scans.
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize)]
pub struct ScanOutcome {
    pub alerts: Vec<SecurityAlert>,
    pub patterns: Vec<SuspiciousPattern>,
}

pub struct PatternDetector {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    roster: Arc<dyn RosterDirectory>,
}

impl PatternDetector {
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
        roster: Arc<dyn RosterDirectory>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            roster,
        }
    }

    /// Runs both heuristics. A failure in one is logged and the other's
    /// results are still returned; the scan only errors when every heuristic
    /// failed.
    pub fn detect(&self) -> Result<ScanOutcome, MonitorError> {
        let mut outcome = ScanOutcome::default();
        let mut first_failure: Option<StoreError> = None;
        let mut failures = 0usize;

        match self.failed_login_bursts() {
            Ok((patterns, alerts)) => {
                outcome.patterns.extend(patterns);
                outcome.alerts.extend(alerts);
            }
            Err(err) => {
                log::warn!("failed-login heuristic skipped: {}", error_chain(&err));
                failures += 1;
                first_failure.get_or_insert(err);
            }
        }

        match self.file_access_volume() {
            Ok((patterns, alerts)) => {
                outcome.patterns.extend(patterns);
                outcome.alerts.extend(alerts);
            }
            Err(err) => {
                log::warn!("file-access heuristic skipped: {}", error_chain(&err));
                failures += 1;
                first_failure.get_or_insert(err);
            }
        }

        if failures == 2 {
            return Err(first_failure.expect("recorded failure").into());
        }
        Ok(outcome)
    }

    /// >= 5 `failed_login` events from one IP inside 15 minutes.
    fn failed_login_bursts(
        &self,
    ) -> Result<(Vec<SuspiciousPattern>, Vec<SecurityAlert>), StoreError> {
        let window_start = Utc::now() - Duration::minutes(FAILED_LOGIN_WINDOW_MINUTES);
        let groups =
            self.store
                .grouped_counts("failed_login", GroupKey::IpAddress, window_start)?;

        let mut patterns = Vec::new();
        let mut alerts = Vec::new();
        for (ip, count) in groups {
            if count < FAILED_LOGIN_CEILING {
                continue;
            }
            patterns.push(SuspiciousPattern {
                pattern_type: REPEATED_FAILED_LOGINS.into(),
                ip_address: Some(ip.clone()),
                user_id: None,
                count,
                severity: Severity::High,
                window_start,
            });
            alerts.push(self.raise(
                REPEATED_FAILED_LOGINS,
                Severity::High,
                format!(
                    "{count} failed logins from {ip} in the last {FAILED_LOGIN_WINDOW_MINUTES} minutes"
                ),
            )?);
        }
        Ok((patterns, alerts))
    }

    /// >= 100 `file_accessed` events by one user inside an hour.
    fn file_access_volume(
        &self,
    ) -> Result<(Vec<SuspiciousPattern>, Vec<SecurityAlert>), StoreError> {
        let window_start = Utc::now() - Duration::hours(FILE_ACCESS_WINDOW_HOURS);
        let groups = self
            .store
            .grouped_counts("file_accessed", GroupKey::UserId, window_start)?;

        let mut patterns = Vec::new();
        let mut alerts = Vec::new();
        for (user, count) in groups {
            if count < FILE_ACCESS_CEILING {
                continue;
            }
            patterns.push(SuspiciousPattern {
                pattern_type: UNUSUAL_FILE_ACCESS.into(),
                ip_address: None,
                user_id: Some(user.clone()),
                count,
                severity: Severity::Medium,
                window_start,
            });
            alerts.push(self.raise(
                UNUSUAL_FILE_ACCESS,
                Severity::Medium,
                format!("user {user} accessed {count} files in the last hour"),
            )?);
        }
        Ok((patterns, alerts))
    }

    /// Builds the alert for a detected pattern and hands it to the
    /// dispatcher. Delivery failure is logged, not propagated; the alert
    /// artifact is part of the scan result either way.
    fn raise(
        &self,
        pattern_type: &str,
        severity: Severity,
        message: String,
    ) -> Result<SecurityAlert, StoreError> {
        let recipients = self.roster.security_team()?;
        // No single triggering event exists for an aggregate pattern.
        let alert = SecurityAlert::new(Uuid::new_v4(), pattern_type, severity, message, recipients);
        if let Err(err) = self.dispatcher.send(&alert) {
            log::warn!("pattern alert {} not delivered: {}", alert.id, error_chain(&err));
        }
        Ok(alert)
    }
}
