//! Error types for correlation and triage.

use thiserror::Error;

use crate::event::Action;

/// Errors that abort correlation of an event stream.
#[derive(Debug, Error)]
pub enum CorrelateError {
    /// The input could not be decoded as a sequence of test events.
    #[error("failed to decode test event: {0}")]
    Decode(#[from] serde_json::Error),

    /// A test reported a clean outcome after the run already timed out.
    ///
    /// A timed out test binary cannot report passing tests afterwards, so the
    /// event producer itself is broken.
    #[error("detected timeout in {timed_out} but test {test} reported {action}")]
    PassAfterTimeout {
        test: String,
        action: Action,
        timed_out: String,
    },
}

/// Errors returned by [`run_triage`](crate::run_triage).
#[derive(Debug, Error)]
pub enum TriageError {
    #[error(transparent)]
    Correlate(#[from] CorrelateError),

    /// Posting a report failed; reports after it were not posted.
    #[error("failed to post issue {title:?} ({remaining} remaining reports not posted)")]
    Post {
        title: String,
        remaining: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
