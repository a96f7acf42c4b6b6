use crate::relocate::encode::encode_project_path;
use crate::relocate::rewrite::locate_cwd;
use crate::relocate::util::is_hidden;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    /// Recorded cwd exists and encodes to this directory.
    Ok,
    /// Recorded cwd no longer exists; the project was moved or deleted.
    Moved,
    /// Recorded cwd exists but encodes to a different directory name.
    Mismatch,
    /// No record file carries a cwd.
    Unknown,
}

impl DriftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Moved => "moved",
            Self::Mismatch => "mismatch",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDrift {
    pub dir_name: String,
    pub cwd: Option<String>,
    pub expected_dir: Option<String>,
    pub status: DriftStatus,
}

fn line_cwd(line: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    let (_, cwd) = locate_cwd(text)?;
    if cwd.is_empty() { None } else { Some(cwd) }
}

/// First non-empty `cwd` in a record file; unreadable files yield `None`.
pub fn first_cwd_in_file(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {
                if let Some(cwd) = line_cwd(&line) {
                    return Some(cwd);
                }
            }
        }
    }
}

/// Top-level `*.jsonl` files of a project dir, in name order.
pub fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

pub fn project_cwd(dir: &Path) -> Result<Option<String>> {
    Ok(record_files(dir)?
        .iter()
        .find_map(|file| first_cwd_in_file(file)))
}

pub fn classify(dir_name: &str, cwd: Option<&str>) -> DriftStatus {
    let Some(cwd) = cwd else {
        return DriftStatus::Unknown;
    };
    if !Path::new(cwd).exists() {
        return DriftStatus::Moved;
    }
    if encode_project_path(cwd) == dir_name {
        DriftStatus::Ok
    } else {
        DriftStatus::Mismatch
    }
}

pub fn scan_projects(projects_dir: &Path) -> Result<Vec<ProjectDrift>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(projects_dir)
        .with_context(|| format!("failed to read {}", projects_dir.display()))?
    {
        let entry = entry?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let file_type = entry.file_type()?;
        if !file_type.is_dir() {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();

    let mut out = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cwd = project_cwd(&dir)?;
        let status = classify(&dir_name, cwd.as_deref());
        out.push(ProjectDrift {
            expected_dir: cwd.as_deref().map(encode_project_path),
            dir_name,
            cwd,
            status,
        });
    }
    Ok(out)
}
