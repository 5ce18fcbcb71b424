//! Idle-expiring connection slot

use super::clock::{Clock, SystemClock};
use super::state::LeaseState;
use crate::config::{CredentialProvider, Credentials, EndpointDescriptor};
use crate::driver::Driver;
use crate::metrics::{counters, histograms, labels};
use crate::{Error, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Default expiration window: 4 hours
pub const DEFAULT_EXPIRATION: Duration = Duration::from_millis(14_400_000);

/// Owns at most one connection and replaces it once it has sat idle for
/// longer than the expiration window
///
/// Nothing happens at construction: the first access connects. Every
/// successful access pushes the deadline out to `now + expiration`, and the
/// first access at or past the deadline closes the old connection
/// (best-effort) and opens a new one. Liveness is never checked against the
/// server.
///
/// All operations take `&mut self` and block on the driver. Share a manager
/// between threads by wrapping it in a `Mutex`.
///
/// # Examples
///
/// ```no_run
/// # fn example() -> wire_lease::Result<()> {
/// use wire_lease::{ConnectionManager, Credentials, EndpointDescriptor, PgDriver};
/// use std::time::Duration;
///
/// let mut manager = ConnectionManager::new(
///     PgDriver::new(),
///     EndpointDescriptor::tcp("localhost", 5432, "app"),
///     Credentials::new("app", "secret"),
///     Some(Duration::from_secs(30 * 60)),
/// )?;
///
/// let mut stmt = manager.get_statement()?;
/// stmt.execute("DELETE FROM sessions WHERE expired")
///     .map_err(wire_lease::Error::connection)?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<D: Driver, C: Clock = SystemClock> {
    driver: D,
    endpoint: EndpointDescriptor,
    credentials: Credentials,
    expiration: Duration,
    expires_at: Instant,
    clock: C,
    slot: Option<D::Connection>,
}

impl<D: Driver> ConnectionManager<D> {
    /// Create a manager without connecting
    ///
    /// `expiration` defaults to [`DEFAULT_EXPIRATION`].
    pub fn new(
        driver: D,
        endpoint: EndpointDescriptor,
        credentials: Credentials,
        expiration: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Self::builder(driver, endpoint, credentials);
        if let Some(expiration) = expiration {
            builder = builder.expiration(expiration);
        }
        builder.build()
    }

    /// Resolve `key` through `provider` once, then create a manager
    pub fn from_provider<P>(
        driver: D,
        provider: &P,
        key: &str,
        expiration: Option<Duration>,
    ) -> Result<Self>
    where
        P: CredentialProvider + ?Sized,
    {
        let (endpoint, credentials) = provider.resolve(key)?.into_parts()?;
        Self::new(driver, endpoint, credentials, expiration)
    }

    /// Start building a manager
    pub fn builder(
        driver: D,
        endpoint: EndpointDescriptor,
        credentials: Credentials,
    ) -> ConnectionManagerBuilder<D> {
        ConnectionManagerBuilder {
            driver,
            endpoint,
            credentials,
            expiration: Window::Default,
            clock: SystemClock,
        }
    }
}

impl<D: Driver, C: Clock> ConnectionManager<D, C> {
    /// Return the live connection, connecting or replacing it as needed
    ///
    /// An expired connection is closed (errors ignored) and replaced with a
    /// fresh one. On failure the manager is left unconnected.
    pub fn get_connection(&mut self) -> Result<&mut D::Connection> {
        self.lease().map(|(_, conn)| conn)
    }

    /// Close the current connection, if any, and open a new one
    ///
    /// For callers that suspect the connection is broken before its deadline.
    pub fn reset_connection(&mut self) -> Result<&mut D::Connection> {
        if let Some(conn) = self.slot.take() {
            tracing::debug!(endpoint = %self.endpoint, "resetting connection on request");
            counters::reset(labels::REASON_EXPLICIT);
            self.close_quietly(conn, labels::REASON_EXPLICIT);
        }

        let conn = self.establish()?;
        self.refresh();
        Ok(self.slot.insert(conn))
    }

    /// Connect only if no connection is held
    ///
    /// Returns `true` when a new connection was made. A held connection is
    /// left alone even when it is past its deadline, and its deadline is not
    /// extended.
    pub fn connect_if_absent(&mut self) -> Result<bool> {
        if self.slot.is_some() {
            return Ok(false);
        }
        self.get_connection()?;
        Ok(true)
    }

    /// Create a statement on the live connection
    pub fn get_statement(&mut self) -> Result<D::Statement<'_>> {
        let (driver, conn) = self.lease()?;
        driver.create_statement(conn).map_err(Error::connection)
    }

    /// Prepare `sql` on the live connection
    pub fn get_prepared_statement(&mut self, sql: &str) -> Result<D::PreparedStatement<'_>> {
        let (driver, conn) = self.lease()?;
        driver.prepare_statement(conn, sql).map_err(Error::connection)
    }

    /// State as of the clock's current time
    pub fn state(&self) -> LeaseState {
        LeaseState::evaluate(self.slot.is_some(), self.clock.now(), self.expires_at)
    }

    /// Whether a connection is held (fresh or expired)
    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }

    /// Deadline after which the held connection is presumed stale
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Configured expiration window
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Endpoint every connection is opened against
    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    /// Credentials every connection is opened with
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Driver used for (re)connects
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn lease(&mut self) -> Result<(&D, &mut D::Connection)> {
        let now = self.clock.now();
        let conn = match self.slot.take() {
            Some(conn) if now < self.expires_at => conn,
            Some(stale) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    state = %LeaseState::ConnectedExpired,
                    "connection expired, reconnecting"
                );
                counters::reset(labels::REASON_EXPIRED);
                self.close_quietly(stale, labels::REASON_EXPIRED);
                self.establish()?
            }
            None => self.establish()?,
        };

        self.refresh();
        Ok((&self.driver, self.slot.insert(conn)))
    }

    fn establish(&self) -> Result<D::Connection> {
        let _span = tracing::info_span!(
            "establish",
            endpoint = %self.endpoint,
            user = %self.credentials.username()
        )
        .entered();

        counters::establish_attempted();
        let started = Instant::now();

        match self.driver.connect(&self.endpoint, &self.credentials) {
            Ok(conn) => {
                counters::establish_succeeded();
                histograms::establish_duration(started.elapsed());
                tracing::info!("connection established");
                Ok(conn)
            }
            Err(e) => {
                counters::establish_failed();
                tracing::warn!(error = %e, "failed to establish connection");
                Err(Error::connection(e))
            }
        }
    }

    fn close_quietly(&self, conn: D::Connection, reason: &'static str) {
        match self.driver.close(conn) {
            Ok(()) => counters::connection_closed(reason, labels::OUTCOME_OK),
            Err(e) => {
                counters::connection_closed(reason, labels::OUTCOME_ERROR);
                tracing::warn!(endpoint = %self.endpoint, reason, error = %e, "ignoring close failure");
            }
        }
    }

    fn refresh(&mut self) {
        // build() rejects windows that overflow from the clock's starting point;
        // a later overflow would need the clock to run for centuries.
        if let Some(deadline) = self.clock.now().checked_add(self.expiration) {
            self.expires_at = deadline;
        }
    }
}

impl<D: Driver, C: Clock> Drop for ConnectionManager<D, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.slot.take() {
            self.close_quietly(conn, labels::REASON_DROPPED);
        }
    }
}

impl<D: Driver, C: Clock> fmt::Debug for ConnectionManager<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("expiration", &self.expiration)
            .field("state", &format_args!("{}", self.state()))
            .finish()
    }
}

enum Window {
    Default,
    Duration(Duration),
    Millis(i64),
}

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder<D: Driver, C: Clock = SystemClock> {
    driver: D,
    endpoint: EndpointDescriptor,
    credentials: Credentials,
    expiration: Window,
    clock: C,
}

impl<D: Driver, C: Clock> ConnectionManagerBuilder<D, C> {
    /// Set the expiration window
    ///
    /// Default: 4 hours. A zero window replaces the connection on every access.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Window::Duration(expiration);
        self
    }

    /// Set the expiration window in milliseconds
    ///
    /// Negative values make [`build`](Self::build) fail.
    pub fn expiration_millis(mut self, millis: i64) -> Self {
        self.expiration = Window::Millis(millis);
        self
    }

    /// Use a different time source
    pub fn clock<C2: Clock>(self, clock: C2) -> ConnectionManagerBuilder<D, C2> {
        ConnectionManagerBuilder {
            driver: self.driver,
            endpoint: self.endpoint,
            credentials: self.credentials,
            expiration: self.expiration,
            clock,
        }
    }

    /// Validate the configuration and create the manager
    ///
    /// Does not connect. The first deadline is set to `now + expiration`.
    pub fn build(self) -> Result<ConnectionManager<D, C>> {
        let expiration = match self.expiration {
            Window::Default => DEFAULT_EXPIRATION,
            Window::Duration(expiration) => expiration,
            Window::Millis(millis) => u64::try_from(millis)
                .map(Duration::from_millis)
                .map_err(|_| {
                    Error::Config(format!(
                        "expiration window must not be negative (got {}ms)",
                        millis
                    ))
                })?,
        };

        let expires_at = self.clock.now().checked_add(expiration).ok_or_else(|| {
            Error::Config(format!("expiration window {:?} is too large", expiration))
        })?;

        tracing::debug!(
            endpoint = %self.endpoint,
            expiration_ms = u64::try_from(expiration.as_millis()).unwrap_or(u64::MAX),
            "connection manager configured"
        );

        Ok(ConnectionManager {
            driver: self.driver,
            endpoint: self.endpoint,
            credentials: self.credentials,
            expiration,
            expires_at,
            clock: self.clock,
            slot: None,
        })
    }
}
