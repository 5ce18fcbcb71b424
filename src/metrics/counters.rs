//! Counter helpers

use super::labels;

/// An establish was attempted
pub fn establish_attempted() {
    metrics::counter!(labels::ESTABLISH_ATTEMPTS).increment(1);
}

/// An establish succeeded
pub fn establish_succeeded() {
    metrics::counter!(labels::ESTABLISH_SUCCESS).increment(1);
}

/// An establish failed
pub fn establish_failed() {
    metrics::counter!(labels::ESTABLISH_FAILURES).increment(1);
}

/// A connection was closed (`outcome` is ok/error, `reason` why it was closed)
pub fn connection_closed(reason: &'static str, outcome: &'static str) {
    metrics::counter!(labels::CLOSES, "reason" => reason, "outcome" => outcome).increment(1);
}

/// A reset happened
pub fn reset(reason: &'static str) {
    metrics::counter!(labels::RESETS, "reason" => reason).increment(1);
}

/// Postgres authentication was attempted
pub fn auth_attempted(mechanism: &'static str) {
    metrics::counter!(labels::AUTH_ATTEMPTS, "mechanism" => mechanism).increment(1);
}

/// Postgres authentication succeeded
pub fn auth_successful(mechanism: &'static str) {
    metrics::counter!(labels::AUTH_SUCCESS, "mechanism" => mechanism).increment(1);
}

/// Postgres authentication failed
pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
    metrics::counter!(labels::AUTH_FAILURES, "mechanism" => mechanism, "reason" => reason)
        .increment(1);
}
