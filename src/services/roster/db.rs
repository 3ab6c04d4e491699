//! BD – roster lookups over the platform account tables.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use crate::error::StoreError;
use crate::schema::{roles, user_roles, users};
use crate::state::DbPool;

use super::RosterDirectory;

type Conn = PooledConnection<ConnectionManager<PgConnection>>;

pub struct PgRoster {
    pool: DbPool,
}

impl PgRoster {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        self.pool.get().map_err(StoreError::Pool)
    }

    fn emails_for_role(&self, role: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn()?;
        users::table
            .inner_join(user_roles::table.on(user_roles::user_id.eq(users::user_id)))
            .inner_join(roles::table.on(roles::role_id.eq(user_roles::role_id)))
            .filter(roles::role_name.eq(role))
            .filter(users::is_active.eq(true))
            .select(users::email)
            .distinct()
            .load(&mut conn)
            .map_err(Into::into)
    }
}

impl RosterDirectory for PgRoster {
    fn active_admins(&self) -> Result<Vec<String>, StoreError> {
        self.emails_for_role("admin")
    }

    fn security_team(&self) -> Result<Vec<String>, StoreError> {
        self.emails_for_role("security")
    }
}
