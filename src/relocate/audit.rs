use crate::relocate::merge::EntryMove;
use crate::relocate::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of a run's `actions.jsonl`. Entries are appended once and never
/// rewritten; together they are the only record of what a run changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    ProjectDirMerge {
        src: String,
        dst: String,
        old_dir: String,
        new_dir: String,
        moved: Vec<(String, String)>,
    },
    RewriteCwd {
        file: String,
        src: String,
        dst: String,
        lines: usize,
        backup: String,
        backup_sha256: String,
        backup_created: bool,
    },
    RmdirEmptyProjectDir {
        dir: String,
    },
    ArchiveSymlinks {
        archive_dir: String,
        moved: Vec<(String, String)>,
    },
}

pub fn moved_pairs(moves: &[EntryMove]) -> Vec<(String, String)> {
    moves
        .iter()
        .map(|m| (m.source.display().to_string(), m.target.display().to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at_epoch_secs: u64,
    #[serde(flatten)]
    pub action: AuditAction,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, action: AuditAction) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let entry = AuditEntry {
            at_epoch_secs: now_epoch_secs()?,
            action,
        };
        let line = format!("{}\n", serde_json::to_string(&entry)?);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append {}", self.path.display()))?;
        Ok(())
    }
}
