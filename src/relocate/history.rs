use crate::relocate::session::{ACTIONS_FILE, RUN_DIR_SUFFIX};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub dir: PathBuf,
    pub has_log: bool,
    pub actions: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn total_actions(&self) -> usize {
        self.actions.values().sum()
    }
}

/// Counts audit entries by `type`; lines that do not parse are counted as
/// `invalid`.
pub fn count_actions(log: &Path) -> Result<BTreeMap<String, usize>> {
    let raw = fs::read_to_string(log).with_context(|| format!("failed to read {}", log.display()))?;
    let mut counts = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let kind = serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "invalid".to_string());
        *counts.entry(kind).or_insert(0) += 1;
    }
    Ok(counts)
}

pub fn list_runs(migrations_dir: &Path) -> Result<Vec<RunSummary>> {
    if !migrations_dir.exists() {
        return Ok(Vec::new());
    }

    let mut runs = Vec::new();
    for entry in fs::read_dir(migrations_dir)
        .with_context(|| format!("failed to read {}", migrations_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type()?.is_dir() || !name.contains(RUN_DIR_SUFFIX) {
            continue;
        }
        let dir = entry.path();
        let log = dir.join(ACTIONS_FILE);
        let has_log = log.is_file();
        let actions = if has_log {
            count_actions(&log)?
        } else {
            BTreeMap::new()
        };
        runs.push(RunSummary {
            name,
            dir,
            has_log,
            actions,
        });
    }
    runs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn list_runs_counts_actions_per_type() {
        let tmp = tempdir().expect("tempdir");
        let migrations = tmp.path().join("_migrations");
        let second = migrations.join("2025-12-16_090000_project_path_migration");
        let first = migrations.join("2025-12-15_001817_project_path_migration");
        fs::create_dir_all(&first).expect("mkdir first");
        fs::create_dir_all(&second).expect("mkdir second");
        fs::create_dir_all(migrations.join("unrelated")).expect("mkdir unrelated");
        fs::write(
            first.join(ACTIONS_FILE),
            "{\"type\":\"project_dir_merge\"}\n{\"type\":\"rewrite_cwd\"}\n{\"type\":\"rewrite_cwd\"}\ngarbage\n",
        )
        .expect("write log");

        let runs = list_runs(&migrations).expect("list");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "2025-12-15_001817_project_path_migration");
        assert_eq!(runs[0].actions.get("rewrite_cwd"), Some(&2));
        assert_eq!(runs[0].actions.get("invalid"), Some(&1));
        assert_eq!(runs[0].total_actions(), 4);
        assert!(!runs[1].has_log);
    }

    #[test]
    fn missing_migrations_dir_lists_nothing() {
        let tmp = tempdir().expect("tempdir");
        assert!(list_runs(&tmp.path().join("absent")).expect("list").is_empty());
    }
}
