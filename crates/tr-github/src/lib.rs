//! GitHub issue filing for test triage.
//!
//! Failure reports become GitHub issues. If an open issue with the same title
//! already exists, the report is added to it as a comment instead, so that
//! repeated failures of the same test accumulate in one place.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tr_core::{FailureReport, IssueSink};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("triage/", env!("CARGO_PKG_VERSION"));
/// GitHub rejects issue and comment bodies longer than this many characters.
const MAX_BODY_CHARS: usize = 65_536;
const TRUNCATION_NOTICE: &str = "\n...\n[truncated]\n```\n";

/// GitHub client errors.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The provided API token was invalid.
    #[error("invalid API token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Failed to start the async runtime.
    #[error("failed to initialize tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Repository issues are filed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// GitHub REST API client.
pub struct Client {
    http: reqwest::Client,
    token: String,
    api_url: String,
    repo: Repository,
    labels: Vec<String>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

/// Outcome of filing a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filed {
    Created { number: u64 },
    Commented { number: u64 },
}

impl Client {
    /// Creates a new client with the given API token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(
        token: impl Into<String>,
        api_url: impl Into<String>,
        repo: Repository,
        labels: Vec<String>,
    ) -> Result<Self, GithubError> {
        let token = token.into();

        if token.is_empty() {
            return Err(GithubError::InvalidToken {
                reason: "API token cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(GithubError::InvalidToken {
                reason: "API token cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GithubError::ClientBuild)?;

        Ok(Self {
            http,
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repo,
            labels,
        })
    }

    /// Files `report`, commenting on an existing open issue with the same
    /// title if there is one.
    pub async fn file(&self, report: &FailureReport) -> Result<Filed, GithubError> {
        let body = format_issue_body(report);
        if let Some(number) = self.find_open_issue(&report.title).await? {
            self.comment(number, &body).await?;
            tracing::info!(number, title = %report.title, "commented on existing issue");
            return Ok(Filed::Commented { number });
        }

        let number = self.create_issue(&report.title, &body).await?;
        tracing::info!(number, title = %report.title, "created issue");
        Ok(Filed::Created { number })
    }

    async fn find_open_issue(&self, title: &str) -> Result<Option<u64>, GithubError> {
        let query = format!(
            "repo:{} is:issue is:open in:title \"{}\"",
            self.repo,
            title.replace('"', "")
        );
        let response = self
            .authorized(self.http.get(format!("{}/search/issues", self.api_url)))
            .query(&[("q", query.as_str())])
            .send()
            .await?;
        let results: SearchResults = parse_response(response).await?;
        Ok(results
            .items
            .into_iter()
            .find(|issue| issue.title == title)
            .map(|issue| issue.number))
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<u64, GithubError> {
        let request = NewIssue {
            title,
            body,
            labels: &self.labels,
        };
        let response = self
            .authorized(self.http.post(format!(
                "{}/repos/{}/{}/issues",
                self.api_url, self.repo.owner, self.repo.name
            )))
            .json(&request)
            .send()
            .await?;
        let issue: Issue = parse_response(response).await?;
        Ok(issue.number)
    }

    async fn comment(&self, number: u64, body: &str) -> Result<(), GithubError> {
        let response = self
            .authorized(self.http.post(format!(
                "{}/repos/{}/{}/issues/{number}/comments",
                self.api_url, self.repo.owner, self.repo.name
            )))
            .json(&NewComment { body })
            .send()
            .await?;
        let _: serde_json::Value = parse_response(response).await?;
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", GITHUB_API_VERSION)
    }
}

/// Blocking [`IssueSink`] over a [`Client`].
#[derive(Debug)]
pub struct GithubSink {
    client: Client,
    runtime: tokio::runtime::Runtime,
}

impl GithubSink {
    pub fn new(client: Client) -> Result<Self, GithubError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(GithubError::Runtime)?;
        Ok(Self { client, runtime })
    }
}

impl IssueSink for GithubSink {
    type Error = GithubError;

    fn post(&mut self, report: &FailureReport) -> Result<(), GithubError> {
        self.runtime.block_on(self.client.file(report)).map(|_| ())
    }
}

#[derive(Debug, Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct NewComment<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    items: Vec<Issue>,
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GithubError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(parse_api_error(&body).unwrap_or_else(|| GithubError::Api {
            message: format!("status {status}: {body}"),
        }));
    }
    serde_json::from_str(&body).map_err(|err| GithubError::InvalidResponse(err.to_string()))
}

fn parse_api_error(body: &str) -> Option<GithubError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| GithubError::Api {
            message: payload.message,
        })
}

/// Renders the markdown body of an issue or comment for `report`.
pub fn format_issue_body(report: &FailureReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Package: `{}`", report.package_name));
    lines.push(format!("Test: `{}`", report.test_name));
    if !report.author_hint.is_empty() {
        lines.push(format!("Suspected author: {}", report.author_hint));
    }
    lines.push(String::new());
    lines.push("```".to_string());
    lines.push(report.message.trim_end().to_string());
    lines.push("```".to_string());
    truncate_body(lines.join("\n") + "\n")
}

fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body;
    }
    let keep = MAX_BODY_CHARS - TRUNCATION_NOTICE.chars().count();
    let cut = body.char_indices().nth(keep).map_or(body.len(), |(idx, _)| idx);
    let mut truncated = body[..cut].to_string();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository {
            owner: "cockroachdb".to_string(),
            name: "cockroach".to_string(),
        }
    }

    fn report(message: &str, author_hint: &str) -> FailureReport {
        FailureReport {
            title: "storage: TestFoo failed under stress".to_string(),
            package_name: "github.com/cockroachdb/cockroach/pkg/storage".to_string(),
            test_name: "TestFoo".to_string(),
            message: message.to_string(),
            author_hint: author_hint.to_string(),
        }
    }

    #[test]
    fn test_client_rejects_empty_token() {
        assert!(matches!(
            Client::new("", DEFAULT_API_URL, repo(), Vec::new()),
            Err(GithubError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_client_rejects_whitespace_token() {
        assert!(matches!(
            Client::new("   ", DEFAULT_API_URL, repo(), Vec::new()),
            Err(GithubError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_client_debug_redacts_token() {
        let client = Client::new("ghp_secret", DEFAULT_API_URL, repo(), Vec::new()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_client_trims_trailing_slash_from_api_url() {
        let client = Client::new("t", "https://ghe.example.com/api/v3/", repo(), Vec::new()).unwrap();
        assert_eq!(client.api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_body_includes_context_fields() {
        let body = format_issue_body(&report("--- FAIL: TestFoo\nboom\n", "dev@example.com"));
        assert_eq!(
            body,
            "Package: `github.com/cockroachdb/cockroach/pkg/storage`\n\
             Test: `TestFoo`\n\
             Suspected author: dev@example.com\n\
             \n\
             ```\n\
             --- FAIL: TestFoo\n\
             boom\n\
             ```\n"
        );
    }

    #[test]
    fn test_body_omits_empty_author() {
        let body = format_issue_body(&report("boom", ""));
        assert!(!body.contains("Suspected author"));
    }

    #[test]
    fn test_long_body_is_truncated_on_char_boundary() {
        let message = "é".repeat(MAX_BODY_CHARS);
        let body = format_issue_body(&report(&message, ""));
        assert_eq!(body.chars().count(), MAX_BODY_CHARS);
        assert!(body.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn test_parse_api_error_reads_message() {
        let err = parse_api_error(r#"{"message":"Bad credentials","documentation_url":"x"}"#)
            .unwrap();
        assert_eq!(err.to_string(), "API error: Bad credentials");
        assert!(parse_api_error("<html>").is_none());
    }
}
