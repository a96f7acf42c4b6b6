use crate::error::MigrateError;
use crate::relocate::RunMode;
use crate::relocate::util::is_hidden;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMove {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Moves completed (or planned, in dry-run) before the batch stopped. When
/// `failure` is set the remaining entries were left in place.
#[derive(Debug, Default)]
pub struct RelocateOutcome {
    pub moves: Vec<EntryMove>,
    pub failure: Option<anyhow::Error>,
}

#[derive(Debug)]
pub enum CleanupOutcome {
    Removed,
    NotEmpty,
    Failed(io::Error),
}

/// `<stem>.conflictNNNN<.ext>` next to `dst`.
pub fn conflict_name(dst: &Path, n: u32) -> PathBuf {
    let mut name = OsString::new();
    if let Some(stem) = dst.file_stem() {
        name.push(stem);
    }
    name.push(format!(".conflict{n:04}"));
    if let Some(ext) = dst.extension() {
        name.push(".");
        name.push(ext);
    }
    dst.with_file_name(name)
}

// Dangling symlinks count as taken.
pub(crate) fn path_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// First of `dst`, `conflict_name(dst, 1..=limit)` that `is_taken` rejects.
pub(crate) fn first_free_name(
    dst: &Path,
    limit: u32,
    is_taken: impl Fn(&Path) -> bool,
) -> Result<PathBuf> {
    if !is_taken(dst) {
        return Ok(dst.to_path_buf());
    }
    for n in 1..=limit {
        let candidate = conflict_name(dst, n);
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(MigrateError::ConflictsExhausted(dst.to_path_buf()).into())
}

fn free_target(dst: &Path, limit: u32, reserved: &BTreeSet<PathBuf>) -> Result<PathBuf> {
    first_free_name(dst, limit, |p| path_taken(p) || reserved.contains(p))
}

/// Moves `src` to `dst` without ever replacing an existing entry. A taken
/// `dst` is retried under conflict names; returns the final destination.
pub fn move_no_overwrite(src: &Path, dst: &Path, limit: u32) -> Result<PathBuf> {
    let target = free_target(dst, limit, &BTreeSet::new())?;
    fs::rename(src, &target)
        .with_context(|| format!("failed to move {} to {}", src.display(), target.display()))?;
    Ok(target)
}

pub(crate) fn sorted_visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if is_hidden(&entry.file_name()) {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

fn relocate_entries(
    entries: Vec<PathBuf>,
    target_dir: &Path,
    mode: RunMode,
    limit: u32,
) -> RelocateOutcome {
    let mut out = RelocateOutcome::default();
    let mut planned = BTreeSet::new();

    for source in entries {
        let Some(name) = source.file_name() else {
            continue;
        };
        let dst = target_dir.join(name);

        let moved = match mode {
            RunMode::DryRun => free_target(&dst, limit, &planned),
            RunMode::Apply => fs::create_dir_all(target_dir)
                .with_context(|| format!("failed to create {}", target_dir.display()))
                .and_then(|_| move_no_overwrite(&source, &dst, limit)),
        };
        match moved {
            Ok(target) => {
                planned.insert(target.clone());
                out.moves.push(EntryMove { source, target });
            }
            Err(err) => {
                out.failure = Some(err);
                break;
            }
        }
    }
    out
}

/// Moves every visible entry of `old_dir` into `new_dir`, in name order.
/// Dry-run computes the same final names, conflicts included, without
/// touching the filesystem.
pub fn merge_project_dirs(
    old_dir: &Path,
    new_dir: &Path,
    mode: RunMode,
    limit: u32,
) -> RelocateOutcome {
    if mode == RunMode::Apply
        && let Err(err) = fs::create_dir_all(new_dir)
    {
        return RelocateOutcome {
            moves: Vec::new(),
            failure: Some(
                anyhow::Error::new(err).context(format!("failed to create {}", new_dir.display())),
            ),
        };
    }

    match sorted_visible_entries(old_dir) {
        Ok(entries) => relocate_entries(entries, new_dir, mode, limit),
        Err(err) => RelocateOutcome {
            moves: Vec::new(),
            failure: Some(err),
        },
    }
}

/// Moves symlinks sitting directly under `projects_dir` into `archive_dir`.
pub fn archive_symlinks(
    projects_dir: &Path,
    archive_dir: &Path,
    mode: RunMode,
    limit: u32,
) -> RelocateOutcome {
    let entries = match sorted_visible_entries(projects_dir) {
        Ok(entries) => entries,
        Err(err) => {
            return RelocateOutcome {
                moves: Vec::new(),
                failure: Some(err),
            };
        }
    };
    let links = entries
        .into_iter()
        .filter(|p| {
            fs::symlink_metadata(p)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
        })
        .collect();
    relocate_entries(links, archive_dir, mode, limit)
}

pub fn remove_if_empty(dir: &Path) -> CleanupOutcome {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return CleanupOutcome::NotEmpty;
            }
        }
        Err(err) => return CleanupOutcome::Failed(err),
    }
    match fs::remove_dir(dir) {
        Ok(()) => CleanupOutcome::Removed,
        Err(err) => CleanupOutcome::Failed(err),
    }
}
