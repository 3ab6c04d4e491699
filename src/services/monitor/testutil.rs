//! Shared fixtures for the engine tests: recording/failing dispatchers, a
//! fixed roster, and a pre-wired monitor over the in-memory store.

use std::sync::{Arc, Mutex};

use crate::config::MonitorRules;
use crate::error::{DispatchError, StoreError};
use crate::services::alerts::{AlertDispatcher, SecurityAlert};
use crate::services::events::memory::MemoryEventStore;
use crate::services::roster::RosterDirectory;

use super::SecurityMonitor;

#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SecurityAlert>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<SecurityAlert> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl AlertDispatcher for RecordingDispatcher {
    fn send(&self, alert: &SecurityAlert) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Always refuses delivery, for isolation tests.
pub struct FailingDispatcher;

impl AlertDispatcher for FailingDispatcher {
    fn send(&self, _alert: &SecurityAlert) -> Result<(), DispatchError> {
        Err(DispatchError::Audit(StoreError::Query(
            diesel::result::Error::BrokenTransactionManager,
        )))
    }
}

pub struct StaticRoster {
    pub admins: Vec<String>,
    pub team: Vec<String>,
}

impl Default for StaticRoster {
    fn default() -> Self {
        Self {
            admins: vec![
                "root@cad-ai.internal".into(),
                "oncall@cad-ai.internal".into(),
            ],
            team: vec!["secops@cad-ai.internal".into()],
        }
    }
}

impl RosterDirectory for StaticRoster {
    fn active_admins(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.admins.clone())
    }

    fn security_team(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.team.clone())
    }
}

/// Monitor over a fresh in-memory store with the default platform rules.
pub fn monitor_with(
    dispatcher: Arc<dyn AlertDispatcher>,
) -> (SecurityMonitor, Arc<MemoryEventStore>, Arc<StaticRoster>) {
    let store = Arc::new(MemoryEventStore::new());
    let roster = Arc::new(StaticRoster::default());
    let monitor = SecurityMonitor::new(
        store.clone(),
        MonitorRules::default(),
        dispatcher,
        roster.clone(),
    );
    (monitor, store, roster)
}
