use crate::relocate::drift::record_files;
use crate::relocate::merge::{
    EntryMove, RelocateOutcome, first_free_name, path_taken, sorted_visible_entries,
};
use crate::relocate::rewrite::rewrite_lines;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Dry-run view of the projects tree: what is on disk, adjusted by every move,
/// removal and rewrite planned earlier in the same run. Lets a later candidate
/// see entries and `cwd` values an earlier candidate would have left for it.
#[derive(Debug, Default)]
pub struct PlannedTree {
    /// On-disk paths planned to move away.
    departed: BTreeSet<PathBuf>,
    /// Planned location -> on-disk path the entry is read from.
    arrived: BTreeMap<PathBuf, PathBuf>,
    removed_dirs: BTreeSet<PathBuf>,
    /// On-disk record file -> (old, new) rewrites planned against it, in order.
    rewrites: BTreeMap<PathBuf, Vec<(String, String)>>,
}

impl PlannedTree {
    fn is_taken(&self, path: &Path) -> bool {
        self.arrived.contains_key(path) || (!self.departed.contains(path) && path_taken(path))
    }

    fn arrivals_in<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a PathBuf)> {
        self.arrived
            .iter()
            .filter(move |(planned, _)| planned.parent() == Some(dir))
    }

    /// Visible entries of `dir` at this point of the run, in name order.
    pub fn entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if self.removed_dirs.contains(dir) {
            anyhow::bail!("failed to read {}: removed earlier in this run", dir.display());
        }
        let mut entries: Vec<PathBuf> = if dir.is_dir() {
            sorted_visible_entries(dir)?
                .into_iter()
                .filter(|p| !self.departed.contains(p))
                .collect()
        } else {
            Vec::new()
        };
        entries.extend(self.arrivals_in(dir).map(|(planned, _)| planned.clone()));
        entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(entries)
    }

    fn record_move(&mut self, source: &Path, target: PathBuf) {
        let origin = match self.arrived.remove(source) {
            Some(origin) => origin,
            None => {
                self.departed.insert(source.to_path_buf());
                source.to_path_buf()
            }
        };
        self.arrived.insert(target, origin);
    }

    /// Plans the merge of `old_dir` into `new_dir` with the same names and
    /// conflict suffixes an apply run would produce.
    pub fn plan_merge(&mut self, old_dir: &Path, new_dir: &Path, limit: u32) -> RelocateOutcome {
        let entries = match self.entries(old_dir) {
            Ok(entries) => entries,
            Err(err) => {
                return RelocateOutcome {
                    moves: Vec::new(),
                    failure: Some(err),
                };
            }
        };
        self.removed_dirs.remove(new_dir);

        let mut out = RelocateOutcome::default();
        for source in entries {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = first_free_name(&new_dir.join(name), limit, |p| self.is_taken(p));
            match target {
                Ok(target) => {
                    self.record_move(&source, target.clone());
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

    /// Marks `dir` removed when nothing, hidden entries included, would be
    /// left in it. Returns whether it would be removed.
    pub fn plan_remove_if_empty(&mut self, dir: &Path) -> bool {
        if self.removed_dirs.contains(dir) || !dir.is_dir() {
            return false;
        }
        let left_on_disk = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .any(|e| !self.departed.contains(&e.path())),
            Err(_) => true,
        };
        if left_on_disk || self.arrivals_in(dir).next().is_some() {
            return false;
        }
        self.removed_dirs.insert(dir.to_path_buf());
        true
    }

    /// Record files of `dir` at this point of the run, as (read from, planned
    /// location), ordered by planned location.
    pub fn record_files(&self, dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
        if dir.is_dir() && !self.removed_dirs.contains(dir) {
            files.extend(
                record_files(dir)?
                    .into_iter()
                    .filter(|p| !self.departed.contains(p))
                    .map(|p| (p.clone(), p)),
            );
        }
        for (planned, origin) in self.arrivals_in(dir) {
            let is_record = planned.extension().and_then(|e| e.to_str()) == Some("jsonl");
            if is_record && origin.is_file() {
                files.push((origin.clone(), planned.clone()));
            }
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    /// Plans rewriting `cwd` from `old` to `new` in the on-disk file `origin`,
    /// on top of the rewrites already planned for it. Returns the number of
    /// lines that would change.
    pub fn plan_rewrite(&mut self, origin: &Path, old: &str, new: &str) -> Result<Option<usize>> {
        let mut content =
            fs::read(origin).with_context(|| format!("failed to read {}", origin.display()))?;
        for (earlier_old, earlier_new) in self.rewrites.get(origin).into_iter().flatten() {
            if let Some((next, _)) = rewrite_lines(&content, earlier_old, earlier_new) {
                content = next;
            }
        }
        let Some((_, lines)) = rewrite_lines(&content, old, new) else {
            return Ok(None);
        };
        self.rewrites
            .entry(origin.to_path_buf())
            .or_default()
            .push((old.to_string(), new.to_string()));
        Ok(Some(lines))
    }
}
