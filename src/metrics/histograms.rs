//! Histogram helpers

use super::labels;
use std::time::Duration;

/// Record how long an establish took
pub fn establish_duration(elapsed: Duration) {
    metrics::histogram!(labels::ESTABLISH_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
}
