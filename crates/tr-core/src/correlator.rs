//! The event-driven state machine turning test events into verdicts.
//!
//! Events must be fed in arrival order. Tests are "outstanding" from their
//! `run` event until a terminal `pass`/`fail`/`skip` event. When a subtest
//! times out or panics, the go test runner emits no terminal events for its
//! siblings and ancestors; those stay outstanding and are ignored, except for
//! the last test started, which is considered failed.

use crate::consolidate::Failures;
use crate::error::CorrelateError;
use crate::event::{Action, TestEvent};
use crate::reconcile::{TimeoutInput, reconcile_timeout_elapsed};
use crate::slow::{SLOW_TEST_THRESHOLD_SECS, SlowTests};
use crate::state::{LastEvent, RunState, STRESS_MARKER, TIMEOUT_MARKER, TimedOut};

/// Everything learned from a fully consumed event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    /// Output of failed tests, before subtest consolidation.
    pub failures: Failures,
    /// Slow tests, unsorted.
    pub slow: SlowTests,
    pub package_output: String,
    pub timeout: Option<TimedOut>,
    pub last_event: Option<LastEvent>,
    pub trusted_timestamps: bool,
}

/// Consumes test events one at a time.
#[derive(Debug, Default)]
pub struct Correlator {
    state: RunState,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event to the run state.
    ///
    /// Fails if a test reports `pass` or `skip` after the run timed out.
    pub fn ingest(&mut self, mut event: TestEvent) -> Result<(), CorrelateError> {
        if event.action == Action::Other {
            tracing::debug!(test = %event.test, "ignoring unrecognized event action");
            return Ok(());
        }

        let state = &mut self.state;
        state.last_event = Some(LastEvent {
            action: event.action,
            test: event.test.clone(),
        });

        if event.is_test_scoped() {
            state.init = false;
        }
        if state.init && state.trust_timestamps && event.output.contains(STRESS_MARKER) {
            tracing::debug!("input comes from stress; not trusting timestamps");
            state.trust_timestamps = false;
        }

        if event.is_test_scoped() && event.elapsed > 0.0 {
            match &state.timeout {
                // Subtests are accounted for by their parent.
                None if event.is_top_level() => state.elapsed_total_sec += event.elapsed,
                Some(timeout) if timeout.test == event.test => {
                    event.elapsed = timeout.event.elapsed;
                }
                _ => {}
            }
        }

        if !event.is_test_scoped() {
            // Preamble and epilogue printed around the test binary, plus
            // anything logged by its main function.
            if event.action == Action::Output {
                state.package_output.push_str(&event.output);
            }
            return Ok(());
        }

        match event.action {
            Action::Run => self.on_run(event),
            Action::Output => self.on_output(event),
            Action::Pass | Action::Skip => self.on_pass(event)?,
            Action::Fail => self.on_fail(event),
            Action::Pause
            | Action::Cont
            | Action::Bench
            | Action::Start
            | Action::Other => {}
        }
        Ok(())
    }

    fn on_run(&mut self, event: TestEvent) {
        let state = &mut self.state;
        if state.trust_timestamps {
            state.cur_test_start = event.time;
        }
        state
            .outstanding_output
            .entry(event.test.clone())
            .or_default();
        state.last_test_name = Some(event.test);
    }

    fn on_output(&mut self, mut event: TestEvent) {
        let state = &mut self.state;
        state
            .outstanding_output
            .entry(event.test.clone())
            .or_default()
            .push(event.clone());

        if !event.output.contains(TIMEOUT_MARKER) {
            return;
        }
        if let Some(timeout) = &state.timeout {
            tracing::debug!(
                test = %event.test,
                timed_out = %timeout.test,
                "ignoring timeout marker after first timeout"
            );
            return;
        }

        event.elapsed = reconcile_timeout_elapsed(&TimeoutInput {
            output: &event.output,
            trust_timestamps: state.trust_timestamps,
            test_start: state.cur_test_start,
            event_time: event.time,
            elapsed_total_sec: state.elapsed_total_sec,
        });
        tracing::info!(test = %event.test, elapsed = event.elapsed, "test timed out");
        state.timeout = Some(TimedOut {
            test: event.test.clone(),
            event,
        });
    }

    fn on_pass(&mut self, event: TestEvent) -> Result<(), CorrelateError> {
        let state = &mut self.state;
        if let Some(timeout) = &state.timeout {
            return Err(CorrelateError::PassAfterTimeout {
                test: event.test,
                action: event.action,
                timed_out: timeout.test.clone(),
            });
        }

        state.outstanding_output.remove(&event.test);
        if event.elapsed > SLOW_TEST_THRESHOLD_SECS && event.is_top_level() {
            state.slow.passing.push(event);
        }
        Ok(())
    }

    fn on_fail(&mut self, event: TestEvent) {
        let state = &mut self.state;
        let timed_out = state.is_timed_out_test(&event.test);
        let output = state
            .outstanding_output
            .remove(&event.test)
            .unwrap_or_default();

        // The timed out test is reported through the timeout report instead.
        if !timed_out {
            state.failures.insert(event.test.clone(), output);
        }
        // The timed out test is kept even if it is a subtest, since its
        // parent will never get a terminal event.
        if event.is_top_level() || timed_out {
            state.slow.failing.push(event);
        }
    }

    /// Reconciles tests left outstanding at the end of the stream.
    pub fn finish(self) -> Correlation {
        let mut state = self.state;

        if let Some(timeout) = &state.timeout {
            // Under stress there is no fail event for the timed out test.
            if state.outstanding_output.remove(&timeout.test).is_some() {
                state.slow.failing.push(timeout.event.clone());
            }
        } else if !state
            .last_event
            .as_ref()
            .is_some_and(LastEvent::is_test_failure)
        {
            // No verdict for the last test: a panic or log.Fatal must have
            // taken down the binary.
            if let Some(test) = state.last_test_name.take() {
                if let Some(output) = state.outstanding_output.remove(&test) {
                    tracing::info!(test = %test, "found outstanding output; considering last test failed");
                    state.failures.insert(test, output);
                }
            }
        }

        Correlation {
            failures: state.failures,
            slow: state.slow,
            package_output: state.package_output,
            timeout: state.timeout,
            last_event: state.last_event,
            trusted_timestamps: state.trust_timestamps,
        }
    }
}

/// Runs a whole stream through a fresh [`Correlator`].
///
/// Stops at the first decode or consistency error.
pub fn correlate<I>(events: I) -> Result<Correlation, CorrelateError>
where
    I: IntoIterator<Item = Result<TestEvent, CorrelateError>>,
{
    let mut correlator = Correlator::new();
    for event in events {
        correlator.ingest(event?)?;
    }
    Ok(correlator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 9, 24, 16, 0, 0).unwrap()
    }

    fn run(test: &str) -> TestEvent {
        TestEvent::new(Action::Run, test)
    }

    fn output(test: &str, text: &str) -> TestEvent {
        TestEvent::new(Action::Output, test).with_output(text)
    }

    fn pass(test: &str, elapsed: f64) -> TestEvent {
        TestEvent::new(Action::Pass, test).with_elapsed(elapsed)
    }

    fn fail(test: &str, elapsed: f64) -> TestEvent {
        TestEvent::new(Action::Fail, test).with_elapsed(elapsed)
    }

    fn correlate_all(events: Vec<TestEvent>) -> Correlation {
        correlate(events.into_iter().map(Ok)).unwrap()
    }

    fn names(events: &[TestEvent]) -> Vec<&str> {
        events.iter().map(|e| e.test.as_str()).collect()
    }

    #[test]
    fn test_passing_fast_test_leaves_nothing() {
        let correlation = correlate_all(vec![run("A"), output("A", "ok"), pass("A", 0.1)]);

        assert!(correlation.failures.is_empty());
        assert!(correlation.slow.failing.is_empty());
        assert!(correlation.slow.passing.is_empty());
        assert!(correlation.timeout.is_none());
    }

    #[test]
    fn test_failing_slow_test_is_recorded() {
        let correlation = correlate_all(vec![run("A"), output("A", "boom"), fail("A", 0.6)]);

        assert_eq!(correlation.failures.len(), 1);
        assert_eq!(correlation.failures["A"][0].output, "boom");
        assert_eq!(names(&correlation.slow.failing), ["A"]);
    }

    #[test]
    fn test_slow_subtests_are_not_ranked() {
        let correlation = correlate_all(vec![
            run("A"),
            run("A/sub"),
            pass("A/sub", 3.0),
            pass("A", 3.5),
            run("B"),
            pass("B", 0.5),
        ]);

        assert_eq!(names(&correlation.slow.passing), ["A"]);
    }

    #[test]
    fn test_subtest_failure_without_parent_verdict() {
        let correlation = correlate_all(vec![
            run("A"),
            run("A/sub"),
            output("A/sub", "x"),
            fail("A/sub", 0.2),
        ]);

        assert_eq!(correlation.failures.keys().collect::<Vec<_>>(), ["A/sub"]);
        assert!(correlation.slow.failing.is_empty());
    }

    #[test]
    fn test_package_output_is_collected() {
        let correlation = correlate_all(vec![
            output("", "make: entering directory\n"),
            run("A"),
            pass("A", 0.0),
            output("", "PASS\n"),
            TestEvent::new(Action::Pass, "").with_elapsed(1.0),
        ]);

        assert_eq!(correlation.package_output, "make: entering directory\nPASS\n");
        assert!(correlation.failures.is_empty());
    }

    #[test]
    fn test_truncated_stream_fails_last_test() {
        let correlation = correlate_all(vec![
            run("A"),
            pass("A", 0.1),
            run("B"),
            output("B", "panic: oh no\n"),
            output("", "FAIL\n"),
            TestEvent::new(Action::Fail, "").with_elapsed(0.3),
        ]);

        assert_eq!(correlation.failures.keys().collect::<Vec<_>>(), ["B"]);
        assert_eq!(correlation.failures["B"][0].output, "panic: oh no\n");
    }

    #[test]
    fn test_trailing_test_failure_does_not_fail_last_started_test() {
        let correlation = correlate_all(vec![
            run("A"),
            run("A/b"),
            output("A/b", "stuck\n"),
            output("A", "A failed\n"),
            fail("A", 1.0),
        ]);

        assert_eq!(correlation.failures.keys().collect::<Vec<_>>(), ["A"]);
    }

    #[test]
    fn test_trusted_timeout_uses_timestamps() {
        let t0 = start_time();
        let correlation = correlate_all(vec![
            run("A").with_time(t0),
            pass("A", 1.0),
            run("B").with_time(t0 + Duration::seconds(1)),
            output("B", "panic: test timed out after 30s\n")
                .with_time(t0 + Duration::milliseconds(31_400)),
        ]);

        let timeout = correlation.timeout.unwrap();
        assert_eq!(timeout.test, "B");
        assert!((timeout.event.elapsed - 30.4).abs() < 1e-9);
        assert!(correlation.trusted_timestamps);
        // The stuck test never got a verdict; it is synthesized as failing.
        assert_eq!(names(&correlation.slow.failing), ["B"]);
        assert!(correlation.failures.is_empty());
    }

    #[test]
    fn test_stress_timeout_subtracts_elapsed_total() {
        let correlation = correlate_all(vec![
            output("", "go test -exec 'stress ' ./pkg/foo\n"),
            run("A"),
            pass("A", 20.0),
            run("A2"),
            run("A2/sub"),
            pass("A2/sub", 4.0),
            pass("A2", 25.0),
            run("B"),
            output("B", "panic: test timed out after 2m\n"),
        ]);

        assert!(!correlation.trusted_timestamps);
        let timeout = correlation.timeout.unwrap();
        assert!((timeout.event.elapsed - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_timed_out_test_fail_event_gets_reconciled_elapsed() {
        let t0 = start_time();
        let correlation = correlate_all(vec![
            run("B").with_time(t0),
            output("B", "panic: test timed out after 10s\n").with_time(t0 + Duration::seconds(10)),
            fail("B", 0.01),
            TestEvent::new(Action::Fail, "").with_elapsed(10.2),
        ]);

        assert_eq!(correlation.slow.failing.len(), 1);
        let entry = &correlation.slow.failing[0];
        assert_eq!(entry.action, Action::Fail);
        assert!((entry.elapsed - 10.0).abs() < 1e-9);
        // Reported through the timeout, not as a regular failure.
        assert!(correlation.failures.is_empty());
    }

    #[test]
    fn test_timed_out_subtest_is_ranked() {
        let t0 = start_time();
        let correlation = correlate_all(vec![
            run("A").with_time(t0),
            run("A/deadlock").with_time(t0),
            output("A/deadlock", "panic: test timed out after 5s\n")
                .with_time(t0 + Duration::seconds(5)),
            fail("A/deadlock", 5.0),
        ]);

        assert_eq!(names(&correlation.slow.failing), ["A/deadlock"]);
    }

    #[test]
    fn test_first_timeout_wins() {
        let correlation = correlate_all(vec![
            output("", "-exec 'stress '\n"),
            run("A"),
            output("A", "panic: test timed out after 1m\n"),
            run("B"),
            output("B", "panic: test timed out after 2m\n"),
        ]);

        let timeout = correlation.timeout.unwrap();
        assert_eq!(timeout.test, "A");
        assert!((timeout.event.elapsed - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_pass_after_timeout_is_fatal() {
        let events = vec![
            run("A"),
            output("A", "panic: test timed out after 1m\n"),
            pass("C", 0.1),
        ];
        let err = correlate(events.into_iter().map(Ok)).unwrap_err();

        assert!(matches!(
            err,
            CorrelateError::PassAfterTimeout { ref test, action: Action::Pass, ref timed_out }
                if test == "C" && timed_out == "A"
        ));
    }

    #[test]
    fn test_skip_after_timeout_is_fatal() {
        let events = vec![
            run("A"),
            output("A", "panic: test timed out after 1m\n"),
            TestEvent::new(Action::Skip, "C"),
        ];
        let err = correlate(events.into_iter().map(Ok)).unwrap_err();

        assert!(matches!(
            err,
            CorrelateError::PassAfterTimeout { ref test, action: Action::Skip, ref timed_out }
                if test == "C" && timed_out == "A"
        ));
    }

    #[test]
    fn test_unrecognized_actions_are_ignored() {
        let correlation = correlate_all(vec![
            TestEvent::new(Action::Other, "").with_output("# pkg/kv\n"),
            run("A"),
            fail("A", 0.2),
            TestEvent::new(Action::Other, ""),
        ]);

        assert!(correlation.package_output.is_empty());
        assert_eq!(correlation.failures.keys().collect::<Vec<_>>(), ["A"]);
        let last = correlation.last_event.unwrap();
        assert_eq!(last.action, Action::Fail);
        assert_eq!(last.test, "A");
    }

    #[test]
    fn test_stress_marker_after_first_test_is_ignored() {
        let correlation = correlate_all(vec![
            run("A"),
            output("", "-exec 'stress '\n"),
            pass("A", 0.1),
        ]);

        assert!(correlation.trusted_timestamps);
    }

    #[test]
    fn test_empty_stream() {
        let correlation = correlate_all(Vec::new());

        assert!(correlation.failures.is_empty());
        assert_eq!(correlation.slow, SlowTests::default());
        assert!(correlation.last_event.is_none());
    }
}
