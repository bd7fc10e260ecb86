//! Deciding whom to blame when the whole test binary timed out.

use crate::slow::SlowTests;

/// Outcome of timeout blame resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Culprit {
    /// The test running at the timeout is also the longest running test;
    /// most likely it deadlocked.
    Test(String),
    /// Some other test took longer, so nobody in particular is blamed.
    Package,
}

/// Blames `timed_out` if it is the slowest test of the run.
///
/// `slow` must already be sorted.
pub fn resolve_culprit(timed_out: &str, slow: &SlowTests) -> Culprit {
    match slow.slowest() {
        Some(slowest) if slowest.test == timed_out => {
            tracing::info!(test = timed_out, "timeout culprit found");
            Culprit::Test(timed_out.to_string())
        }
        _ => {
            tracing::info!(test = timed_out, "timeout culprit not found");
            Culprit::Package
        }
    }
}
