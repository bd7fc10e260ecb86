//! Core logic for triaging go test runs.
//!
//! This crate turns a stream of `go test -json` events into:
//! - Correlation: per-test verdicts and the output of failing tests
//! - Consolidation: one failure per top-level test
//! - Slow test ranking and the slow tests report
//! - Timeout blame: whether a single test caused the binary to time out
//! - Failure reports handed to an issue tracker

mod consolidate;
mod correlator;
mod culprit;
pub mod decode;
mod error;
pub mod event;
pub mod reconcile;
mod report;
mod slow;
mod state;

pub use consolidate::{Failures, consolidate};
pub use correlator::{Correlation, Correlator, correlate};
pub use culprit::{Culprit, resolve_culprit};
pub use decode::decode_events;
pub use error::{CorrelateError, TriageError};
pub use event::{Action, TestEvent};
pub use reconcile::{
    TimeoutInput, UNKNOWN_ELAPSED, parse_timeout_duration, reconcile_timeout_elapsed,
};
pub use report::{
    AuthorLookup, EmittedReports, FailureReport, IssueSink, NoAuthorLookup, ReportContext,
    ReportStore, TriageSummary, UNKNOWN_TEST, build_reports, run_triage,
};
pub use slow::{MAX_REPORTED_SLOW_TESTS, SLOW_TEST_THRESHOLD_SECS, SlowTests, SlowTestsReport};
pub use state::{LastEvent, STRESS_MARKER, TIMEOUT_MARKER, TimedOut};
