//! Connection lifecycle management
//!
//! This module handles:
//! * Lazy establish on first access
//! * Idle expiry tracking against a pluggable clock
//! * Forced reset-then-reconnect
//! * Lease state classification

mod clock;
mod lease;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lease::{ConnectionManager, ConnectionManagerBuilder, DEFAULT_EXPIRATION};
pub use state::LeaseState;
