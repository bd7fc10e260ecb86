//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Import path of the test package that produced the events.
    pub package_name: Option<String>,
    /// Prefix stripped from the package name in issue titles.
    pub package_prefix: String,
    /// Go module path; the package directory is the package name minus this.
    pub module_path: String,
    /// Where the slow tests report is written.
    pub slow_report_path: PathBuf,
    /// Assignee for timeouts no single test can be blamed for.
    pub timeout_fallback_author: Option<String>,
    pub github: GithubConfig,
}

/// Where and how issues are filed.
#[derive(Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub token: Option<String>,
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub labels: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("package_name", &self.package_name)
            .field("package_prefix", &self.package_prefix)
            .field("module_path", &self.module_path)
            .field("slow_report_path", &self.slow_report_path)
            .field("timeout_fallback_author", &self.timeout_fallback_author)
            .field("github", &self.github)
            .finish()
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("labels", &self.labels)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package_name: None,
            package_prefix: "github.com/cockroachdb/cockroach/pkg/".to_string(),
            module_path: "github.com/cockroachdb/cockroach".to_string(),
            slow_report_path: PathBuf::from("artifacts/slow-tests-report.txt"),
            timeout_fallback_author: None,
            github: GithubConfig::default(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: tr_github::DEFAULT_API_URL.to_string(),
            owner: "cockroachdb".to_string(),
            repo: "cockroach".to_string(),
            labels: vec!["C-test-failure".to_string(), "O-robot".to_string()],
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Variables set by the CI scripts that invoke us
        figment = figment
            .merge(Env::raw().only(&["PKG"]).map(|_| "package_name".into()))
            .merge(
                Env::raw()
                    .only(&["GITHUB_API_TOKEN"])
                    .map(|_| "github.token".into()),
            );

        // Load from environment variables (TRIAGE_*, TRIAGE_GITHUB__TOKEN)
        figment = figment.merge(Env::prefixed("TRIAGE_").split("__"));

        figment.extract()
    }

    /// Assignee for package-level timeouts, empty if unset.
    pub fn timeout_fallback_author(&self) -> &str {
        self.timeout_fallback_author.as_deref().unwrap_or_default()
    }
}

/// Returns the platform-specific config directory for triage.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("triage"))
}
