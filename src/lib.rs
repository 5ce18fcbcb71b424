//! wire-lease: a lazily established, idle-expiring database connection
//!
//! A [`ConnectionManager`] owns at most one connection. It connects on first
//! use, hands the same connection out while it is being used, and replaces it
//! once it has been idle for longer than its expiration window. Connections
//! are opened through a [`Driver`]; [`PgDriver`] is a blocking Postgres
//! implementation of that trait.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   resolve(key)   ┌──────────────────────┐
//! │ ConnectionManager │ ───────────────► │  CredentialProvider  │
//! │  (lease + clock)  │                  │ (YAML files, static) │
//! └─────────┬─────────┘                  └──────────────────────┘
//!           │ connect / close / statements
//! ┌─────────▼─────────┐
//! │      Driver       │   PgDriver: startup, auth (SCRAM), queries
//! └─────────┬─────────┘
//!           │
//! ┌─────────▼─────────┐
//! │     Protocol      │   Postgres wire protocol v3
//! └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! # fn example() -> wire_lease::Result<()> {
//! use wire_lease::{ConnectionManager, PgDriver, YamlCredentialProvider};
//!
//! let provider = YamlCredentialProvider::from_dir("config");
//! let mut manager = ConnectionManager::from_provider(PgDriver::new(), &provider, "analytics", None)?;
//!
//! let rows = manager
//!     .get_statement()?
//!     .execute("UPDATE jobs SET state = 'queued' WHERE state = 'stuck'")
//!     .map_err(wire_lease::Error::connection)?;
//! println!("requeued {} jobs", rows);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod postgres;
pub mod protocol;

pub use config::{
    ConnectionInfo, CredentialProvider, Credentials, DatabaseInfo, EndpointDescriptor,
    StaticCredentialProvider, YamlCredentialProvider,
};
pub use driver::Driver;
pub use error::{Error, Result};
pub use manager::{
    Clock, ConnectionManager, ConnectionManagerBuilder, LeaseState, ManualClock, SystemClock,
    DEFAULT_EXPIRATION,
};
pub use postgres::{PgConfig, PgDriver, PgError};
