//! Blocking Postgres driver
//!
//! Speaks protocol v3 over TCP or a Unix socket. Supports trust, cleartext
//! and SCRAM-SHA-256 authentication; TLS is not offered.

mod config;
mod driver;
mod error;
mod session;
mod state;
mod statement;
mod transport;

pub use config::PgConfig;
pub use driver::{PgConnection, PgDriver};
pub use error::PgError;
pub use session::Session;
pub use state::SessionState;
pub use statement::{PgPreparedStatement, PgStatement};
pub use transport::Transport;
