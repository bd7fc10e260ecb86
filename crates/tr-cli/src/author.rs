//! Test author lookup via git history.
//!
//! The author of a test is the last committer to touch the line declaring
//! the test function, found with `git grep` and `git blame`.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tr_core::AuthorLookup;
use tr_core::event::top_level_name;

/// First two `:`-separated fields of `git grep -n` output: file and line.
static GREP_LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^:\n]+):(\d+):").unwrap());

static AUTHOR_MAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^author-mail <(.*)>").unwrap());

/// Errors looking up a test author.
#[derive(Debug, Error)]
pub enum AuthorError {
    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't find test {test} in {package}: {output}")]
    TestNotFound {
        test: String,
        package: String,
        output: String,
    },
    #[error("couldn't find author of test {test} in {package}: {output}")]
    AuthorNotFound {
        test: String,
        package: String,
        output: String,
    },
}

/// Looks up authors in the git checkout containing `workdir`.
#[derive(Debug, Clone)]
pub struct GitAuthorLookup {
    workdir: PathBuf,
    module_path: String,
}

impl GitAuthorLookup {
    pub fn new(workdir: impl Into<PathBuf>, module_path: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            module_path: module_path.into(),
        }
    }

    /// Package directory relative to the repository root.
    fn package_dir<'a>(&self, package_name: &'a str) -> &'a str {
        package_name
            .strip_prefix(self.module_path.as_str())
            .map_or(package_name, |rest| rest.trim_start_matches('/'))
    }

    fn git(&self, command: &'static str, args: &[&str]) -> Result<(bool, String), AuthorError> {
        let output = Command::new("git")
            .current_dir(&self.workdir)
            .arg(command)
            .args(args)
            .output()
            .map_err(|source| AuthorError::Spawn { command, source })?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((output.status.success(), text))
    }
}

impl AuthorLookup for GitAuthorLookup {
    type Error = AuthorError;

    fn author_hint(&self, package_name: &str, test_name: &str) -> Result<String, AuthorError> {
        let test = top_level_name(test_name);
        let dir = self.package_dir(package_name);
        let not_found = |output: String| AuthorError::TestNotFound {
            test: test.to_string(),
            package: dir.to_string(),
            output,
        };

        let (ok, root) = self.git("rev-parse", &["--show-toplevel"])?;
        if !ok {
            return Err(not_found(root));
        }
        let root = root.trim();

        let pattern = format!("func {test}(");
        let pathspec = format!("{root}/{dir}/*_test.go");
        let (ok, grep) = self.git("grep", &["-n", "-F", "-e", &pattern, "--", &pathspec])?;
        if !ok {
            return Err(not_found(grep));
        }
        let Some((file, line)) = parse_grep_location(&grep) else {
            return Err(not_found(grep));
        };

        let range = format!("-L{line},+1");
        let (ok, blame) = self.git("blame", &["--porcelain", &range, "--", &file])?;
        let author = if ok { parse_author_mail(&blame) } else { None };
        author.ok_or_else(|| AuthorError::AuthorNotFound {
            test: test.to_string(),
            package: dir.to_string(),
            output: blame,
        })
    }
}

/// Parses `path/to/foo_test.go:31:func TestFoo(t *testing.T) {`.
fn parse_grep_location(output: &str) -> Option<(String, u32)> {
    let caps = GREP_LOCATION_RE.captures(output)?;
    let line = caps[2].parse().ok()?;
    Some((caps[1].to_string(), line))
}

/// Parses the `author-mail <jordan@cockroachlabs.com>` porcelain line.
fn parse_author_mail(output: &str) -> Option<String> {
    AUTHOR_MAIL_RE
        .captures(output)
        .map(|caps| caps[1].to_string())
        .filter(|mail| !mail.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_grep_location() {
        let output = "pkg/ccl/storageccl/export_test.go:31:func TestExportCmd(t *testing.T) {\n";
        assert_eq!(
            parse_grep_location(output),
            Some(("pkg/ccl/storageccl/export_test.go".to_string(), 31))
        );
        assert_eq!(parse_grep_location("fatal: not a git repository\n"), None);
    }

    #[test]
    fn test_parses_author_mail() {
        let output = "\
4f3a0c1 31 31 1
author Jordan Lewis
author-mail <jordan@cockroachlabs.com>
author-time 1500000000
";
        assert_eq!(
            parse_author_mail(output),
            Some("jordan@cockroachlabs.com".to_string())
        );
        assert_eq!(parse_author_mail("author Jordan\n"), None);
    }

    #[test]
    fn test_package_dir_strips_module_path() {
        let lookup = GitAuthorLookup::new(".", "github.com/cockroachdb/cockroach");
        assert_eq!(
            lookup.package_dir("github.com/cockroachdb/cockroach/pkg/storage"),
            "pkg/storage"
        );
        assert_eq!(lookup.package_dir("example.com/other"), "example.com/other");
    }

    #[test]
    fn test_lookup_outside_repository_fails() {
        let temp = tempfile::tempdir().unwrap();
        let lookup = GitAuthorLookup::new(temp.path(), "github.com/cockroachdb/cockroach");
        assert!(
            lookup
                .author_hint("github.com/cockroachdb/cockroach/pkg/storage", "TestFoo/bar")
                .is_err()
        );
    }
}
