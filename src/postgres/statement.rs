//! Statement handles

use super::{PgConnection, PgError};

/// Runs SQL text on a borrowed connection
#[derive(Debug)]
pub struct PgStatement<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgStatement<'c> {
    pub(super) fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Run `sql` (simple query protocol) and return the rows affected
    pub fn execute(&mut self, sql: &str) -> Result<u64, PgError> {
        self.conn.simple_query(sql)
    }
}

/// Named server-side statement on a borrowed connection
#[derive(Debug)]
pub struct PgPreparedStatement<'c> {
    conn: &'c mut PgConnection,
    name: String,
    sql: String,
}

impl<'c> PgPreparedStatement<'c> {
    pub(super) fn new(conn: &'c mut PgConnection, name: String, sql: &str) -> Self {
        Self {
            conn,
            name,
            sql: sql.to_string(),
        }
    }

    /// Bind text parameters (`None` is NULL), run, return rows affected
    pub fn execute(&mut self, params: &[Option<&str>]) -> Result<u64, PgError> {
        self.conn.execute_prepared(&self.name, params)
    }

    /// Server-side statement name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL text as prepared
    pub fn sql(&self) -> &str {
        &self.sql
    }
}
