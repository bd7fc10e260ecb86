//! Slow test ranking and the slow tests report.

use std::fmt;

use crate::event::TestEvent;

/// Tests that took this long or less are not considered for slow test
/// reporting. Protects the report against large numbers of generated
/// subtests.
pub const SLOW_TEST_THRESHOLD_SECS: f64 = 0.5;

/// Maximum number of entries listed per report section.
pub const MAX_REPORTED_SLOW_TESTS: usize = 20;

/// Terminal events of slow tests, split by outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlowTests {
    pub failing: Vec<TestEvent>,
    pub passing: Vec<TestEvent>,
}

impl SlowTests {
    /// Sorts both lists by elapsed time, slowest first.
    pub fn sort(&mut self) {
        sort_descending(&mut self.failing);
        sort_descending(&mut self.passing);
    }

    /// The slowest entry across both lists. Assumes the lists are sorted.
    ///
    /// Ties go to the failing list.
    pub fn slowest(&self) -> Option<&TestEvent> {
        match (self.failing.first(), self.passing.first()) {
            (Some(failing), Some(passing)) if passing.elapsed > failing.elapsed => Some(passing),
            (Some(failing), _) => Some(failing),
            (None, passing) => passing,
        }
    }

    /// Renders the plain-text report.
    pub fn report(&self) -> SlowTestsReport<'_> {
        SlowTestsReport(self)
    }
}

fn sort_descending(events: &mut [TestEvent]) {
    events.sort_by(|a, b| b.elapsed.total_cmp(&a.elapsed));
}

/// Display adapter for [`SlowTests`].
#[derive(Debug, Clone, Copy)]
pub struct SlowTestsReport<'a>(&'a SlowTests);

impl fmt::Display for SlowTestsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Slow failing tests:")?;
        write_section(f, &self.0.failing)?;
        writeln!(f)?;
        writeln!(f, "Slow passing tests:")?;
        write_section(f, &self.0.passing)
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, events: &[TestEvent]) -> fmt::Result {
    if events.is_empty() {
        return writeln!(f, "<none>");
    }
    for event in events.iter().take(MAX_REPORTED_SLOW_TESTS) {
        writeln!(f, "{} - {:.2}s", event.test, event.elapsed)?;
    }
    Ok(())
}
