//! Driver abstraction
//!
//! A driver performs the handshake and authentication for one connection and
//! hands out statement handles that borrow it. [`ConnectionManager`] only
//! ever talks to the server through this trait.
//!
//! [`ConnectionManager`]: crate::ConnectionManager

use crate::config::{Credentials, EndpointDescriptor};

/// Transport/driver layer used by a [`ConnectionManager`](crate::ConnectionManager)
pub trait Driver {
    /// Established connection
    type Connection;

    /// Statement handle borrowing a connection
    type Statement<'c>
    where
        Self: 'c;

    /// Prepared statement handle borrowing a connection
    type PreparedStatement<'c>
    where
        Self: 'c;

    /// Driver failure
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open and authenticate a new connection. Blocks until done.
    fn connect(
        &self,
        endpoint: &EndpointDescriptor,
        credentials: &Credentials,
    ) -> Result<Self::Connection, Self::Error>;

    /// Close a connection. Callers treat failures as ignorable.
    fn close(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Create a statement on `conn`
    fn create_statement<'c>(
        &'c self,
        conn: &'c mut Self::Connection,
    ) -> Result<Self::Statement<'c>, Self::Error>;

    /// Prepare `sql` on `conn`. The SQL is passed through untouched.
    fn prepare_statement<'c>(
        &'c self,
        conn: &'c mut Self::Connection,
        sql: &str,
    ) -> Result<Self::PreparedStatement<'c>, Self::Error>;
}
