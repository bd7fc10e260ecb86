//! Slow tests report persistence.

use std::fs;
use std::io;
use std::path::PathBuf;

use tr_core::ReportStore;

/// Writes the slow tests report to a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    path: PathBuf,
}

impl FileReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportStore for FileReportStore {
    type Error = io::Error;

    fn write(&self, report: &str) -> Result<(), io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, report)?;
        tracing::debug!(path = %self.path.display(), "wrote slow tests report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_report_creating_directories() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("artifacts/slow-tests-report.txt");

        FileReportStore::new(&path).write("Slow failing tests:\n").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "Slow failing tests:\n");
    }

    #[test]
    fn test_write_into_file_as_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("artifacts");
        fs::write(&blocker, "").unwrap();

        let store = FileReportStore::new(blocker.join("slow.txt"));
        assert!(store.write("report").is_err());
    }
}
