//! JSON run report written by `--report`

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::RunReport;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A finished run, as written to disk
#[derive(Debug, Serialize)]
pub struct RunRecord<'a> {
    pub manifest: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub change_count: usize,
    pub pending_count: usize,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

impl<'a> RunRecord<'a> {
    pub fn new(manifest: &Path, started_at: DateTime<Utc>, report: &'a RunReport) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            success: report.is_success(),
            change_count: report.change_count(),
            pending_count: report.pending_count(),
            report,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, content)
            .with_context(|| format!("Could not write report: {}", path.display()))?;
        log::info!("Wrote run report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{LogEntry, Outcome, ResourceId, Transition};
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn test_report_shape() {
        let report = RunReport {
            entries: vec![
                LogEntry {
                    id: ResourceId::new("package", "cobbler"),
                    outcome: Outcome::Changed {
                        transition: Transition::Created,
                    },
                },
                LogEntry {
                    id: ResourceId::new("service", "cobblerd"),
                    outcome: Outcome::Refreshed,
                },
            ],
            ..RunReport::default()
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/run.json");
        RunRecord::new(Path::new("converge.toml"), Utc::now(), &report)
            .write(&path)
            .unwrap();

        let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["success"], Value::Bool(true));
        assert_eq!(json["change_count"], 2);
        assert_eq!(json["dry_run"], Value::Bool(false));
        assert_eq!(json["entries"][0]["id"], "package[cobbler]");
        assert_eq!(json["entries"][0]["status"], "changed");
        assert_eq!(json["entries"][0]["transition"], "created");
        assert_eq!(json["entries"][1]["status"], "refreshed");
        assert!(json["started_at"].is_string());
    }
}
