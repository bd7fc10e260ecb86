//! Printing reports instead of filing them.

use std::io::{self, Write};

use tr_core::{FailureReport, IssueSink};

/// Writes each report to `writer` in a human-readable form.
#[derive(Debug)]
pub struct DryRunSink<W> {
    writer: W,
}

impl<W: Write> DryRunSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> IssueSink for DryRunSink<W> {
    type Error = io::Error;

    fn post(&mut self, report: &FailureReport) -> Result<(), io::Error> {
        let author = if report.author_hint.is_empty() {
            "(none)"
        } else {
            report.author_hint.as_str()
        };
        writeln!(self.writer, "=== {}", report.title)?;
        writeln!(self.writer, "package: {}", report.package_name)?;
        writeln!(self.writer, "test: {}", report.test_name)?;
        writeln!(self.writer, "author: {author}")?;
        writeln!(self.writer)?;
        write!(self.writer, "{}", report.message)?;
        if !report.message.ends_with('\n') {
            writeln!(self.writer)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}
