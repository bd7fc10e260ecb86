//! Duration reconstruction for a timed out test.
//!
//! The elapsed time test2json reports for a timed out test is bogus (see
//! golang/go#27568), and when the run went through `stress` there is no
//! terminal event at all. We therefore compute the duration ourselves:
//!
//! - With trusted timestamps, the duration is the distance between the test's
//!   `run` event and the timeout panic.
//! - Otherwise, the timeout from the panic message minus the time taken by all
//!   other top-level tests seen so far. This ignores sibling subtests and is
//!   coarse for short timeouts, since quick tests round down to zero.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Elapsed value used when the duration cannot be determined.
pub const UNKNOWN_ELAPSED: f64 = -1.0;

/// Go duration following the timeout panic, e.g. `30s`, `2m0s`, `1h0m0s`.
static TIMEOUT_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"timed out after ((?:(?:\d+(?:\.\d*)?|\.\d+)(?:h|ms|us|µs|ns|m|s))+)").unwrap()
});

/// A single `<number><unit>` component of a Go duration.
static DURATION_COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(h|ms|us|µs|ns|m|s)").unwrap());

/// Everything the reconciler needs to know about a timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutInput<'a> {
    /// Output line containing the timeout marker.
    pub output: &'a str,
    /// Whether per-event timestamps are meaningful.
    pub trust_timestamps: bool,
    /// Time of the `run` event of the test that was running.
    pub test_start: Option<DateTime<Utc>>,
    /// Time of the event carrying the marker.
    pub event_time: Option<DateTime<Utc>>,
    /// Sum of top-level test durations seen before the timeout.
    pub elapsed_total_sec: f64,
}

/// Computes the elapsed seconds of the timed out test.
///
/// Returns [`UNKNOWN_ELAPSED`] when the duration cannot be determined.
pub fn reconcile_timeout_elapsed(input: &TimeoutInput<'_>) -> f64 {
    if input.trust_timestamps {
        let (Some(start), Some(end)) = (input.test_start, input.event_time) else {
            tracing::warn!("timeout event is missing timestamps; elapsed time unknown");
            return UNKNOWN_ELAPSED;
        };
        return seconds_between(start, end);
    }

    match parse_timeout_duration(input.output) {
        Some(timeout) => timeout - input.elapsed_total_sec,
        None => {
            tracing::warn!(output = input.output, "failed to parse timeout message");
            UNKNOWN_ELAPSED
        }
    }
}

/// Extracts the timeout, in seconds, from a `test timed out after <d>` line.
pub fn parse_timeout_duration(output: &str) -> Option<f64> {
    let caps = TIMEOUT_AFTER_RE.captures(output)?;
    let mut total = 0.0;
    for component in DURATION_COMPONENT_RE.captures_iter(&caps[1]) {
        let value: f64 = component[1].parse().ok()?;
        let scale = match &component[2] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };
        total += value * scale;
    }
    Some(total)
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    delta.num_nanoseconds().map_or_else(
        || delta.num_milliseconds() as f64 / 1e3,
        |nanos| nanos as f64 / 1e9,
    )
}
