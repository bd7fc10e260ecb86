//! Test lifecycle events as emitted by `go test -json` / `go tool test2json`.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Separator between a parent test and its subtest in a test name.
pub const SUBTEST_SEPARATOR: char = '/';

/// The kind of lifecycle event.
///
/// Only `run`, `output`, `pass`, `fail` and `skip` drive the correlator. Any
/// other action, including ones added by newer go releases such as
/// `build-output`, decodes to a variant the correlator ignores, so a valid
/// stream never fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Run,
    Output,
    Pass,
    Fail,
    Skip,
    Pause,
    Cont,
    Bench,
    Start,
    /// An action with no meaning to the correlator.
    Other,
}

impl Action {
    /// String representation used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Output => "output",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Pause => "pause",
            Self::Cont => "cont",
            Self::Bench => "bench",
            Self::Start => "start",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "run" => Self::Run,
            "output" => Self::Output,
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "skip" => Self::Skip,
            "pause" => Self::Pause,
            "cont" => Self::Cont,
            "bench" => Self::Bench,
            "start" => Self::Start,
            _ => Self::Other,
        }
    }
}

impl FromStr for Action {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A single test2json record.
///
/// Package-scope events leave `test` empty. `elapsed` is only populated on
/// terminal events and is `0.0` otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    pub action: Action,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub output: String,
    /// Wall-clock instant. Meaningless when the run went through `stress`.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Seconds.
    #[serde(default)]
    pub elapsed: f64,
}

impl TestEvent {
    /// Creates an event with no output, time or elapsed duration.
    pub fn new(action: Action, test: impl Into<String>) -> Self {
        Self {
            action,
            package: None,
            test: test.into(),
            output: String::new(),
            time: None,
            elapsed: 0.0,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    #[must_use]
    pub const fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = elapsed;
        self
    }

    #[must_use]
    pub const fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Whether the event belongs to a test rather than the package.
    pub fn is_test_scoped(&self) -> bool {
        !self.test.is_empty()
    }

    /// Whether the event's test is a top-level test (not a subtest).
    pub fn is_top_level(&self) -> bool {
        is_top_level(&self.test)
    }
}

/// Whether `test` names a top-level test.
pub fn is_top_level(test: &str) -> bool {
    !test.contains(SUBTEST_SEPARATOR)
}

/// Name of the top-level test that owns `test`.
///
/// `TestFoo/bar/baz` belongs to `TestFoo`.
pub fn top_level_name(test: &str) -> &str {
    test.split_once(SUBTEST_SEPARATOR)
        .map_or(test, |(parent, _)| parent)
}
