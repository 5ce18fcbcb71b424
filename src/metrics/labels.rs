//! Metric names and label values

/// Connection establish attempts
pub const ESTABLISH_ATTEMPTS: &str = "wire_lease_establish_attempts_total";
/// Successful establishes
pub const ESTABLISH_SUCCESS: &str = "wire_lease_establish_success_total";
/// Failed establishes
pub const ESTABLISH_FAILURES: &str = "wire_lease_establish_failures_total";
/// Connection closes, labelled by outcome
pub const CLOSES: &str = "wire_lease_closes_total";
/// Resets, labelled by reason
pub const RESETS: &str = "wire_lease_resets_total";
/// Establish duration in milliseconds
pub const ESTABLISH_DURATION_MS: &str = "wire_lease_establish_duration_ms";

/// Postgres authentication attempts
pub const AUTH_ATTEMPTS: &str = "wire_lease_pg_auth_attempts_total";
/// Postgres authentication successes
pub const AUTH_SUCCESS: &str = "wire_lease_pg_auth_success_total";
/// Postgres authentication failures
pub const AUTH_FAILURES: &str = "wire_lease_pg_auth_failures_total";

/// Reset triggered by an expired lease
pub const REASON_EXPIRED: &str = "expired";
/// Reset requested by the caller
pub const REASON_EXPLICIT: &str = "explicit";
/// Close on drop of the manager
pub const REASON_DROPPED: &str = "dropped";

/// Close completed
pub const OUTCOME_OK: &str = "ok";
/// Close failed (ignored)
pub const OUTCOME_ERROR: &str = "error";

/// Cleartext password authentication
pub const MECHANISM_CLEARTEXT: &str = "cleartext";
/// SCRAM-SHA-256 authentication
pub const MECHANISM_SCRAM: &str = "scram-sha-256";
/// Server accepted without a password exchange
pub const MECHANISM_TRUST: &str = "trust";
