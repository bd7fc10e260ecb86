//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

/// Files issues for failed and timed out go tests.
///
/// Reads the JSON output of `go test -json` (or `go tool test2json`) and files
/// one issue per failed top-level test. If the test binary timed out, files
/// an issue blaming the test that caused it, if one can be identified. If no
/// test failed but the package did, assumes a build error and files the whole
/// log.
#[derive(Debug, Parser)]
#[command(name = "triage", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Read test events from this file instead of stdin.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Import path of the test package (overrides config and `PKG`).
    #[arg(short, long)]
    pub package: Option<String>,

    /// Where to write the slow tests report (overrides config).
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    /// Print reports to stdout instead of filing GitHub issues.
    #[arg(long)]
    pub dry_run: bool,
}
