//! Per-run accumulator owned by the correlator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::consolidate::Failures;
use crate::event::{Action, TestEvent};
use crate::slow::SlowTests;

/// Output line that marks a test binary killed by `-timeout`.
pub const TIMEOUT_MARKER: &str = "panic: test timed out after";

/// Preamble fragment printed when the test binary runs under `stress`.
pub const STRESS_MARKER: &str = "-exec 'stress '";

/// The test that was running when the binary timed out.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOut {
    pub test: String,
    /// The event carrying the timeout marker, with `elapsed` reconciled.
    pub event: TestEvent,
}

/// Action and test of the most recently decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastEvent {
    pub action: Action,
    pub test: String,
}

impl LastEvent {
    /// Whether the stream ended on a failure verdict for a named test.
    pub fn is_test_failure(&self) -> bool {
        self.action == Action::Fail && !self.test.is_empty()
    }
}

/// Everything that must persist across events of a single stream.
#[derive(Debug)]
pub(crate) struct RunState {
    /// Output of tests that have started but not finished.
    pub outstanding_output: HashMap<String, Vec<TestEvent>>,
    pub failures: Failures,
    pub slow: SlowTests,
    /// Output outside the context of any test.
    pub package_output: String,
    /// True for the preamble, before the first test event.
    pub init: bool,
    pub trust_timestamps: bool,
    /// Sum of top-level test durations, used when timestamps are not trusted.
    pub elapsed_total_sec: f64,
    pub timeout: Option<TimedOut>,
    pub cur_test_start: Option<DateTime<Utc>>,
    pub last_test_name: Option<String>,
    pub last_event: Option<LastEvent>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            outstanding_output: HashMap::new(),
            failures: Failures::new(),
            slow: SlowTests::default(),
            package_output: String::new(),
            init: true,
            trust_timestamps: true,
            elapsed_total_sec: 0.0,
            timeout: None,
            cur_test_start: None,
            last_test_name: None,
            last_event: None,
        }
    }
}

impl RunState {
    pub fn is_timed_out_test(&self, test: &str) -> bool {
        self.timeout.as_ref().is_some_and(|t| t.test == test)
    }
}
