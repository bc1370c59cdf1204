//! Report storage API.
//!
//! Reports are kept as pretty-printed JSON files under a root
//! directory, one file per named run.

use std::fs;
use std::path::PathBuf;

use crate::types::RunReport;
use crate::{ResultsError, ResultsResult};

#[derive(Clone)]
pub struct ReportStore {
    root_dir: PathBuf,
}

impl ReportStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    fn report_path(&self, name: &str) -> PathBuf {
        self.root_dir.join(format!("{name}.json"))
    }

    pub fn has_report(&self, name: &str) -> bool {
        self.report_path(name).exists()
    }

    pub fn save_report(&self, name: &str, report: &RunReport) -> ResultsResult<()> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(self.report_path(name), json)?;
        Ok(())
    }

    pub fn load_report(&self, name: &str) -> ResultsResult<RunReport> {
        let path = self.report_path(name);
        if !path.exists() {
            return Err(ResultsError::ReportNotFound { name: name.to_string() });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn list_reports(&self) -> ResultsResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem()
            {
                names.push(stem.to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete_report(&self, name: &str) -> ResultsResult<()> {
        let path = self.report_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RunDiagnostics;

    fn empty_report() -> RunReport {
        RunReport {
            nodes: vec![],
            links: vec![],
            single_period: true,
            diagnostics: RunDiagnostics::default(),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("reports")).unwrap();

        assert!(!store.has_report("run1"));
        store.save_report("run1", &empty_report()).unwrap();
        assert!(store.has_report("run1"));

        let loaded = store.load_report("run1").unwrap();
        assert_eq!(loaded, empty_report());
        assert_eq!(store.list_reports().unwrap(), vec!["run1".to_string()]);

        store.delete_report("run1").unwrap();
        assert!(!store.has_report("run1"));
    }

    #[test]
    fn missing_report_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.load_report("ghost").unwrap_err();
        assert!(matches!(err, ResultsError::ReportNotFound { .. }));
    }
}
