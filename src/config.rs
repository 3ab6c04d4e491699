//! Engine configuration: threshold rules and the critical-type set.
//!
//! These are plain data handed to `SecurityMonitor` at construction, never
//! global statics, so tests can build a monitor with their own rules.

use std::collections::{HashMap, HashSet};

use chrono::Duration;

/// Ceiling for same-type events inside a trailing window.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdRule {
    pub max_count: i64,
    pub window: Duration,
}

impl ThresholdRule {
    pub fn new(max_count: i64, window_secs: i64) -> Self {
        Self {
            max_count,
            window: Duration::seconds(window_secs),
        }
    }
}

/// Static rule set for the monitor: per-type thresholds plus the event types
/// that escalate unconditionally.
#[derive(Debug, Clone)]
pub struct MonitorRules {
    pub thresholds: HashMap<String, ThresholdRule>,
    pub critical_types: HashSet<String>,
}

impl Default for MonitorRules {
    fn default() -> Self {
        let thresholds = HashMap::from([
            ("suspicious_activity".into(), ThresholdRule::new(5, 300)),
            ("unauthorized_access".into(), ThresholdRule::new(3, 300)),
            ("failed_login".into(), ThresholdRule::new(10, 900)),
            ("file_access_violation".into(), ThresholdRule::new(5, 600)),
        ]);
        let critical_types = HashSet::from([
            "data_breach".into(),
            "unauthorized_admin_access".into(),
            "system_compromise".into(),
            "malware_detected".into(),
            "encryption_key_compromise".into(),
        ]);
        Self {
            thresholds,
            critical_types,
        }
    }
}
