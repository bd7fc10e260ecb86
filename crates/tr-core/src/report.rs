//! Turning a correlated stream into failure reports.

use std::fmt;

use crate::consolidate::consolidate;
use crate::correlator::{Correlation, correlate};
use crate::culprit::{Culprit, resolve_culprit};
use crate::error::{CorrelateError, TriageError};
use crate::event::{Action, TestEvent};

/// Test name used when no particular test is blamed.
pub const UNKNOWN_TEST: &str = "(unknown)";

/// An issue to be filed for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub title: String,
    pub package_name: String,
    pub test_name: String,
    pub message: String,
    /// Opaque hint used to assign the issue, usually an email address.
    pub author_hint: String,
}

/// Files failure reports somewhere.
pub trait IssueSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn post(&mut self, report: &FailureReport) -> Result<(), Self::Error>;
}

/// Persists the slow tests report.
pub trait ReportStore {
    type Error: std::error::Error;

    fn write(&self, report: &str) -> Result<(), Self::Error>;
}

/// Finds who should be assigned a failing test.
pub trait AuthorLookup {
    type Error: std::error::Error;

    fn author_hint(&self, package_name: &str, test_name: &str) -> Result<String, Self::Error>;
}

/// Author lookup that never knows anybody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorLookup;

impl AuthorLookup for NoAuthorLookup {
    type Error = std::convert::Infallible;

    fn author_hint(&self, _package_name: &str, _test_name: &str) -> Result<String, Self::Error> {
        Ok(String::new())
    }
}

/// Startup context needed to build reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    /// Full import path of the test package.
    pub package_name: String,
    /// Prefix trimmed from the package name in issue titles.
    pub package_prefix: String,
    /// Assignee for timeouts that cannot be pinned on a single test.
    pub timeout_fallback_author: String,
}

impl ReportContext {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            package_prefix: String::new(),
            timeout_fallback_author: String::new(),
        }
    }

    /// Package name as shown in issue titles.
    pub fn short_package_name(&self) -> &str {
        self.package_name
            .strip_prefix(self.package_prefix.as_str())
            .unwrap_or(&self.package_name)
    }

    fn report(
        &self,
        title: String,
        test_name: &str,
        message: String,
        author_hint: String,
    ) -> FailureReport {
        FailureReport {
            title,
            package_name: self.package_name.clone(),
            test_name: test_name.to_string(),
            message,
            author_hint,
        }
    }
}

/// Reports built from one stream, in posting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedReports {
    pub reports: Vec<FailureReport>,
    pub slow_report: String,
    pub slow_failing: usize,
    pub slow_passing: usize,
    /// Set when the run timed out.
    pub culprit: Option<Culprit>,
}

/// Consolidates failures, ranks slow tests and builds the reports to file.
///
/// Failures are emitted sorted by test name, followed by the timeout report
/// if the run timed out. A stream ending in a failure verdict with no failed
/// test and no timeout produces a single package failure report, on the
/// assumption that the failure happened before any test ran.
pub fn build_reports<A: AuthorLookup>(
    correlation: Correlation,
    ctx: &ReportContext,
    authors: &A,
) -> EmittedReports {
    let Correlation {
        failures,
        mut slow,
        package_output,
        timeout,
        last_event,
        trusted_timestamps,
    } = correlation;
    if !trusted_timestamps {
        tracing::debug!("timestamps not trusted; timeout duration derived from elapsed times");
    }
    let pkg = ctx.short_package_name();
    let mut reports = Vec::new();

    let package_failed = last_event
        .as_ref()
        .is_some_and(|e| e.action == Action::Fail);
    if package_failed && failures.is_empty() && timeout.is_none() {
        reports.push(ctx.report(
            format!("{pkg}: package failed under stress"),
            UNKNOWN_TEST,
            package_output,
            String::new(),
        ));
    } else {
        for (test, events) in consolidate(failures) {
            let author = lookup_author(authors, ctx, &test);
            reports.push(ctx.report(
                format!("{pkg}: {test} failed under stress"),
                &test,
                concat_output(&events),
                author,
            ));
        }
    }

    slow.sort();
    let slow_report = slow.report().to_string();

    let culprit = timeout.map(|timeout| {
        let culprit = resolve_culprit(&timeout.test, &slow);
        let report = match &culprit {
            Culprit::Test(test) => ctx.report(
                format!("{pkg}: {test} timed out under stress"),
                test,
                slow_report.clone(),
                lookup_author(authors, ctx, test),
            ),
            Culprit::Package => ctx.report(
                format!("{pkg}: package timed out under stress"),
                UNKNOWN_TEST,
                slow_report.clone(),
                ctx.timeout_fallback_author.clone(),
            ),
        };
        reports.push(report);
        culprit
    });

    EmittedReports {
        reports,
        slow_report,
        slow_failing: slow.failing.len(),
        slow_passing: slow.passing.len(),
        culprit,
    }
}

fn lookup_author<A: AuthorLookup>(authors: &A, ctx: &ReportContext, test: &str) -> String {
    authors
        .author_hint(&ctx.package_name, test)
        .unwrap_or_else(|err| {
            tracing::warn!(test, error = %err, "unable to determine test author");
            String::new()
        })
}

fn concat_output(events: &[TestEvent]) -> String {
    events.iter().map(|e| e.output.as_str()).collect()
}

/// What a triage run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageSummary {
    pub posted: usize,
    pub slow_failing: usize,
    pub slow_passing: usize,
    pub culprit: Option<Culprit>,
}

impl fmt::Display for TriageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "posted {} issue(s); {} slow failing, {} slow passing",
            self.posted, self.slow_failing, self.slow_passing
        )?;
        match &self.culprit {
            Some(Culprit::Test(test)) => write!(f, "; timeout culprit {test}"),
            Some(Culprit::Package) => write!(f, "; package timed out"),
            None => Ok(()),
        }
    }
}

/// Correlates `events`, stores the slow tests report and posts every report.
///
/// Nothing is written or posted unless the whole stream correlates. Failing
/// to store the slow tests report is only logged. Posting stops at the first
/// error, leaving later reports unposted.
pub fn run_triage<I, A, S, K>(
    events: I,
    ctx: &ReportContext,
    authors: &A,
    store: &S,
    sink: &mut K,
) -> Result<TriageSummary, TriageError>
where
    I: IntoIterator<Item = Result<TestEvent, CorrelateError>>,
    A: AuthorLookup,
    S: ReportStore,
    K: IssueSink,
{
    let correlation = correlate(events)?;
    let emitted = build_reports(correlation, ctx, authors);

    if let Err(err) = store.write(&emitted.slow_report) {
        tracing::warn!(error = %err, "failed to write slow tests report");
    }

    let total = emitted.reports.len();
    for (idx, report) in emitted.reports.iter().enumerate() {
        tracing::info!(title = %report.title, "filing issue");
        if let Err(err) = sink.post(report) {
            let remaining = total - idx - 1;
            tracing::error!(
                title = %report.title,
                remaining,
                error = %err,
                "failed to post issue; remaining reports will not be filed"
            );
            return Err(TriageError::Post {
                title: report.title.clone(),
                remaining,
                source: Box::new(err),
            });
        }
    }

    Ok(TriageSummary {
        posted: total,
        slow_failing: emitted.slow_failing,
        slow_passing: emitted.slow_passing,
        culprit: emitted.culprit,
    })
}
