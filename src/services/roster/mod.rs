//! Recipient lookup for alerts: active admins and the security team.
//! Escalation re-reads the roster on every critical event, so membership
//! changes take effect without a restart.

pub mod db;

use crate::error::StoreError;

pub trait RosterDirectory: Send + Sync {
    /// Addresses of active accounts holding the `admin` role.
    fn active_admins(&self) -> Result<Vec<String>, StoreError>;

    /// Addresses of active accounts holding the `security` role.
    fn security_team(&self) -> Result<Vec<String>, StoreError>;
}
