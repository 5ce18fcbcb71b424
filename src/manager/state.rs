//! Lease state machine

use std::time::Instant;

/// Lifecycle state of a managed connection
///
/// `ConnectedFresh` turns into `ConnectedExpired` passively, as time passes;
/// the change is only observed on the next access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// No connection held (never connected, reset, or last establish failed)
    Unconnected,

    /// Connection held and its deadline has not passed
    ConnectedFresh,

    /// Connection held but presumed stale
    ConnectedExpired,
}

impl LeaseState {
    /// Classify a slot at `now` against `expires_at`
    pub fn evaluate(connected: bool, now: Instant, expires_at: Instant) -> Self {
        match (connected, now >= expires_at) {
            (false, _) => LeaseState::Unconnected,
            (true, false) => LeaseState::ConnectedFresh,
            (true, true) => LeaseState::ConnectedExpired,
        }
    }

    /// Whether a connection is held
    pub fn is_connected(&self) -> bool {
        !matches!(self, LeaseState::Unconnected)
    }
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::ConnectedFresh => write!(f, "connected_fresh"),
            Self::ConnectedExpired => write!(f, "connected_expired"),
        }
    }
}
