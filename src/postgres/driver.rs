//! Blocking Postgres driver

use super::{PgConfig, PgError, PgPreparedStatement, PgStatement, Session, SessionState, Transport};
use crate::config::{Credentials, EndpointDescriptor};
use crate::driver::Driver;
use std::fmt;
use tokio::runtime::{Builder, Runtime};

/// Postgres implementation of [`Driver`]
///
/// Every connection drives its socket on a private current-thread runtime,
/// so the driver must not be called from inside an async context.
#[derive(Debug, Clone, Default)]
pub struct PgDriver {
    config: PgConfig,
}

impl PgDriver {
    /// Driver with default session options
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver with custom session options
    pub fn with_config(config: PgConfig) -> Self {
        Self { config }
    }

    /// Session options
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    async fn open(
        &self,
        endpoint: &EndpointDescriptor,
        credentials: &Credentials,
    ) -> Result<Session<Transport>, PgError> {
        let handshake = async {
            let transport = Transport::connect(endpoint).await?;
            let mut session = Session::new(transport);
            session
                .startup(&self.config, endpoint.database(), credentials)
                .await?;
            Ok::<_, PgError>(session)
        };

        match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| PgError::Timeout(limit))?,
            None => handshake.await,
        }
    }
}

/// Authenticated Postgres connection
pub struct PgConnection {
    // Declared before the runtime so the socket is dropped first
    session: Session<Transport>,
    runtime: Runtime,
}

impl PgConnection {
    /// Backend process id
    pub fn process_id(&self) -> Option<i32> {
        self.session.process_id()
    }

    /// Server parameter reported at startup (e.g. `server_version`)
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.session.parameter(name)
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub(super) fn simple_query(&mut self, sql: &str) -> Result<u64, PgError> {
        self.runtime.block_on(self.session.simple_query(sql))
    }

    pub(super) fn prepare(&mut self, sql: &str) -> Result<String, PgError> {
        self.runtime.block_on(self.session.prepare(sql))
    }

    pub(super) fn execute_prepared(
        &mut self,
        name: &str,
        params: &[Option<&str>],
    ) -> Result<u64, PgError> {
        self.runtime
            .block_on(self.session.execute_prepared(name, params))
    }

    fn ensure_idle(&self) -> Result<(), PgError> {
        match self.session.state() {
            SessionState::Idle => Ok(()),
            other => Err(PgError::InvalidState {
                expected: SessionState::Idle.to_string(),
                actual: other.to_string(),
            }),
        }
    }
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("process_id", &self.session.process_id())
            .field("state", &self.session.state())
            .finish()
    }
}

impl Driver for PgDriver {
    type Connection = PgConnection;
    type Statement<'c> = PgStatement<'c>;
    type PreparedStatement<'c> = PgPreparedStatement<'c>;
    type Error = PgError;

    fn connect(
        &self,
        endpoint: &EndpointDescriptor,
        credentials: &Credentials,
    ) -> Result<PgConnection, PgError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let session = runtime.block_on(self.open(endpoint, credentials))?;
        tracing::debug!(
            endpoint = %endpoint,
            process_id = ?session.process_id(),
            "postgres connection open"
        );
        Ok(PgConnection { session, runtime })
    }

    fn close(&self, conn: PgConnection) -> Result<(), PgError> {
        let PgConnection { session, runtime } = conn;
        runtime.block_on(session.close())
    }

    fn create_statement<'c>(&'c self, conn: &'c mut PgConnection) -> Result<PgStatement<'c>, PgError> {
        conn.ensure_idle()?;
        Ok(PgStatement::new(conn))
    }

    fn prepare_statement<'c>(
        &'c self,
        conn: &'c mut PgConnection,
        sql: &str,
    ) -> Result<PgPreparedStatement<'c>, PgError> {
        conn.ensure_idle()?;
        let name = conn.prepare(sql)?;
        Ok(PgPreparedStatement::new(conn, name, sql))
    }
}
