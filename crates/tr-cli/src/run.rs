//! Wiring the triage pipeline to its collaborators.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tr_core::{ReportContext, TriageSummary, decode_events, run_triage};
use tr_github::{Client, GithubSink, Repository};

use crate::Config;
use crate::author::GitAuthorLookup;
use crate::cli::Cli;
use crate::sink::DryRunSink;
use crate::store::FileReportStore;

/// Effective settings after applying CLI overrides to the config.
#[derive(Debug)]
pub struct Settings {
    pub ctx: ReportContext,
    pub report_path: PathBuf,
    pub dry_run: bool,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let package_name = cli
            .package
            .clone()
            .or_else(|| config.package_name.clone())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .context("package name is not set (use --package, PKG or TRIAGE_PACKAGE_NAME)")?;

        Ok(Self {
            ctx: ReportContext {
                package_name,
                package_prefix: config.package_prefix.clone(),
                timeout_fallback_author: config.timeout_fallback_author().to_string(),
            },
            report_path: cli
                .report_path
                .clone()
                .unwrap_or_else(|| config.slow_report_path.clone()),
            dry_run: cli.dry_run,
        })
    }
}

/// Runs triage over the events in `cli.input` (or stdin).
///
/// Dry runs print reports to `writer`; otherwise they are filed on GitHub.
pub fn run<W: Write>(writer: &mut W, cli: &Cli, config: &Config) -> Result<TriageSummary> {
    let settings = Settings::resolve(cli, config)?;
    let input: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let workdir = std::env::current_dir().context("failed to determine working directory")?;
    let authors = GitAuthorLookup::new(workdir, config.module_path.clone());

    triage(input, writer, &settings, config, &authors)
}

fn triage<R: Read, W: Write>(
    input: R,
    writer: &mut W,
    settings: &Settings,
    config: &Config,
    authors: &GitAuthorLookup,
) -> Result<TriageSummary> {
    let store = FileReportStore::new(&settings.report_path);
    let events = decode_events(input);

    let summary = if settings.dry_run {
        let mut sink = DryRunSink::new(writer);
        run_triage(events, &settings.ctx, authors, &store, &mut sink)
    } else {
        let token = config
            .github
            .token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing GitHub token (set GITHUB_API_TOKEN or TRIAGE_GITHUB__TOKEN)")
            })?;
        let client = Client::new(
            token,
            config.github.api_url.clone(),
            Repository {
                owner: config.github.owner.clone(),
                name: config.github.repo.clone(),
            },
            config.github.labels.clone(),
        )
        .context("failed to create GitHub client")?;
        let mut sink = GithubSink::new(client).context("failed to create GitHub client")?;
        run_triage(events, &settings.ctx, authors, &store, &mut sink)
    };

    summary.context("failed to triage test results")
}
