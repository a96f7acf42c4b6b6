use crate::error::MigrateError;
use crate::relocate::RunMode;
use crate::relocate::audit::{AuditAction, AuditLog, moved_pairs};
use crate::relocate::candidates::{Candidate, resolve_candidates};
use crate::relocate::drift::record_files;
use crate::relocate::ledger::{LedgerSources, MoveLedger, write_moves_csv};
use crate::relocate::merge::{
    CleanupOutcome, EntryMove, archive_symlinks, merge_project_dirs, remove_if_empty,
};
use crate::relocate::paths::MigratePaths;
use crate::relocate::plan::PlannedTree;
use crate::relocate::rewrite::{BackupTarget, rewrite_record_cwds};
use crate::relocate::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const RUN_DIR_SUFFIX: &str = "_project_path_migration";
pub const ACTIONS_FILE: &str = "actions.jsonl";
pub const BACKUPS_DIR: &str = "backups";
const LOCK_FILE: &str = ".migrate.lock";

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub mode: RunMode,
    pub sources: LedgerSources,
    pub archive_symlinks: bool,
    pub conflict_limit: u32,
    pub stamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub old_path: String,
    pub new_path: String,
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
    pub merge_skipped: bool,
    pub moved: Vec<EntryMove>,
    pub rewritten: Vec<PathBuf>,
    pub removed_old_dir: bool,
    pub cleanup_note: Option<String>,
    pub error: Option<String>,
}

impl CandidateOutcome {
    fn new(candidate: &Candidate) -> Self {
        Self {
            old_path: candidate.old_path.clone(),
            new_path: candidate.new_path.clone(),
            old_dir: candidate.old_dir.clone(),
            new_dir: candidate.new_dir.clone(),
            merge_skipped: false,
            moved: Vec::new(),
            rewritten: Vec::new(),
            removed_old_dir: false,
            cleanup_note: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymlinkArchiveOutcome {
    pub archive_dir: PathBuf,
    pub moved: Vec<EntryMove>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub mode: RunMode,
    pub claude_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub mappings: usize,
    pub manual_pairs: usize,
    pub candidates: Vec<CandidateOutcome>,
    pub symlinks: Option<SymlinkArchiveOutcome>,
    pub run_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub backup_root: Option<PathBuf>,
}

impl MigrationSummary {
    pub fn failed_candidates(&self) -> usize {
        self.candidates.iter().filter(|c| c.error.is_some()).count()
    }
}

/// The per-run directory of an apply run. Holding it keeps the migrations
/// lock; the lock is released on drop.
#[derive(Debug)]
pub struct RunDir {
    pub dir: PathBuf,
    pub backup_root: PathBuf,
    pub audit: AuditLog,
    _lock: fs::File,
}

fn acquire_lock(migrations_dir: &Path) -> Result<fs::File> {
    let path = migrations_dir.join(LOCK_FILE);
    let file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    FileExt::try_lock_exclusive(&file).map_err(|_| MigrateError::RunLocked(path.clone()))?;
    Ok(file)
}

fn create_unique_run_dir(migrations_dir: &Path, stamp: &str) -> Result<PathBuf> {
    let base = format!("{stamp}{RUN_DIR_SUFFIX}");
    for attempt in 1..=100u32 {
        let name = if attempt == 1 {
            base.clone()
        } else {
            format!("{base}-{attempt}")
        };
        let dir = migrations_dir.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", dir.display()));
            }
        }
    }
    anyhow::bail!(
        "could not allocate a fresh run directory for stamp {stamp} in {}",
        migrations_dir.display()
    )
}

impl RunDir {
    pub fn create(paths: &MigratePaths, opts: &MigrationOptions, ledger: &MoveLedger) -> Result<Self> {
        fs::create_dir_all(&paths.migrations_dir)
            .with_context(|| format!("failed to create {}", paths.migrations_dir.display()))?;
        let lock = acquire_lock(&paths.migrations_dir)?;

        let dir = create_unique_run_dir(&paths.migrations_dir, &opts.stamp)?;
        let backup_root = dir.join(BACKUPS_DIR);
        fs::create_dir_all(&backup_root)
            .with_context(|| format!("failed to create {}", backup_root.display()))?;

        if ledger.moves_present {
            let copy = dir.join("moves.csv");
            fs::copy(&opts.sources.moves, &copy).with_context(|| {
                format!("failed to copy {} into run dir", opts.sources.moves.display())
            })?;
        }
        if ledger.corrections_present {
            let copy = dir.join("moves_corrections.csv");
            fs::copy(&opts.sources.corrections, &copy).with_context(|| {
                format!(
                    "failed to copy {} into run dir",
                    opts.sources.corrections.display()
                )
            })?;
        }
        if !ledger.pair_records.is_empty() {
            write_moves_csv(&ledger.pair_records, &dir.join("pairs.csv"))?;
        }

        Ok(Self {
            audit: AuditLog::new(dir.join(ACTIONS_FILE)),
            dir,
            backup_root,
            _lock: lock,
        })
    }
}

pub struct MigrationSession {
    paths: MigratePaths,
    opts: MigrationOptions,
    ledger: MoveLedger,
    run: Option<RunDir>,
}

impl MigrationSession {
    /// Loads the ledger and, in apply mode, opens the run directory. Fails
    /// before touching anything when there is neither a base ledger nor a
    /// manual pair.
    pub fn prepare(paths: MigratePaths, opts: MigrationOptions) -> Result<Self> {
        let ledger = MoveLedger::load(&opts.sources)?;
        if !ledger.moves_present && ledger.pair_records.is_empty() {
            return Err(MigrateError::MissingLedger(opts.sources.moves.clone()).into());
        }

        let run = match opts.mode {
            RunMode::Apply => Some(RunDir::create(&paths, &opts, &ledger)?),
            RunMode::DryRun => None,
        };

        Ok(Self {
            paths,
            opts,
            ledger,
            run,
        })
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        resolve_candidates(&self.ledger.mapping, &self.paths.projects_dir)
    }

    fn backup_target(&self) -> BackupTarget {
        let backup_root = self
            .run
            .as_ref()
            .map(|run| run.backup_root.clone())
            .unwrap_or_else(|| self.paths.migrations_dir.join(BACKUPS_DIR));
        BackupTarget {
            backup_root,
            projects_dir: self.paths.projects_dir.clone(),
        }
    }

    fn record(&self, action: AuditAction) -> Result<()> {
        match &self.run {
            Some(run) => run.audit.append(action),
            None => Ok(()),
        }
    }

    /// Record files to rewrite for one candidate, as (read from, reported as).
    /// Apply reads `new_dir` after the merge; dry-run asks the planned tree,
    /// which already holds this candidate's planned arrivals.
    fn files_to_rewrite(
        &self,
        candidate: &Candidate,
        plan: &PlannedTree,
    ) -> Result<Vec<(PathBuf, PathBuf)>> {
        match self.opts.mode {
            RunMode::DryRun => plan.record_files(&candidate.new_dir),
            RunMode::Apply if candidate.new_dir.is_dir() => Ok(record_files(&candidate.new_dir)?
                .into_iter()
                .map(|p| (p.clone(), p))
                .collect()),
            RunMode::Apply => Ok(Vec::new()),
        }
    }

    fn migrate_candidate(
        &self,
        candidate: &Candidate,
        plan: &mut PlannedTree,
        outcome: &mut CandidateOutcome,
    ) -> Result<()> {
        let mode = self.opts.mode;
        let limit = self.opts.conflict_limit;
        let mut merge_failure = None;

        if candidate.shares_project_dir() {
            outcome.merge_skipped = true;
        } else {
            let merge = match mode {
                RunMode::Apply => {
                    merge_project_dirs(&candidate.old_dir, &candidate.new_dir, mode, limit)
                }
                RunMode::DryRun => plan.plan_merge(&candidate.old_dir, &candidate.new_dir, limit),
            };
            outcome.moved = merge.moves;
            self.record(AuditAction::ProjectDirMerge {
                src: candidate.old_path.clone(),
                dst: candidate.new_path.clone(),
                old_dir: candidate.old_dir.display().to_string(),
                new_dir: candidate.new_dir.display().to_string(),
                moved: moved_pairs(&outcome.moved),
            })?;
            merge_failure = merge.failure;
        }

        let backups = self.backup_target();
        for (read_from, reported) in self.files_to_rewrite(candidate, plan)? {
            if mode == RunMode::DryRun {
                if plan
                    .plan_rewrite(&read_from, &candidate.old_path, &candidate.new_path)?
                    .is_some()
                {
                    outcome.rewritten.push(reported);
                }
                continue;
            }

            let rewrite = rewrite_record_cwds(
                &read_from,
                &candidate.old_path,
                &candidate.new_path,
                &backups,
                mode,
            )?;
            if !rewrite.changed {
                continue;
            }
            if let Some(backup) = &rewrite.backup {
                self.record(AuditAction::RewriteCwd {
                    file: reported.display().to_string(),
                    src: candidate.old_path.clone(),
                    dst: candidate.new_path.clone(),
                    lines: rewrite.lines_rewritten,
                    backup: backup.path.display().to_string(),
                    backup_sha256: backup.sha256.clone(),
                    backup_created: backup.created,
                })?;
            }
            outcome.rewritten.push(reported);
        }

        if let Some(err) = merge_failure {
            return Err(err);
        }

        if candidate.shares_project_dir() {
            return Ok(());
        }
        match mode {
            RunMode::DryRun => {
                plan.plan_remove_if_empty(&candidate.old_dir);
            }
            RunMode::Apply => match remove_if_empty(&candidate.old_dir) {
                CleanupOutcome::Removed => {
                    outcome.removed_old_dir = true;
                    self.record(AuditAction::RmdirEmptyProjectDir {
                        dir: candidate.old_dir.display().to_string(),
                    })?;
                }
                CleanupOutcome::NotEmpty => {
                    outcome.cleanup_note = Some("old project dir kept: not empty".to_string());
                }
                CleanupOutcome::Failed(err) => {
                    outcome.cleanup_note = Some(format!("old project dir kept: {err}"));
                }
            },
        }

        Ok(())
    }

    fn process_candidate(&self, candidate: &Candidate, plan: &mut PlannedTree) -> CandidateOutcome {
        let mut outcome = CandidateOutcome::new(candidate);
        if let Err(err) = self.migrate_candidate(candidate, plan, &mut outcome) {
            let err_text = format!("{err:#}");
            warn::emit(WarnEvent {
                code: "CANDIDATE_FAILED",
                stage: "migrate",
                action: "migrate-project-dir",
                project: &candidate.old_path,
                path: &candidate.old_dir.display().to_string(),
                reason: "continuing-with-next-candidate",
                err: &err_text,
            });
            outcome.error = Some(err_text);
        }
        outcome
    }

    fn archive_project_symlinks(&self) -> SymlinkArchiveOutcome {
        let archive_dir = self
            .paths
            .projects_dir
            .join(format!(".archived_symlinks_{}", self.opts.stamp));
        let out = archive_symlinks(
            &self.paths.projects_dir,
            &archive_dir,
            self.opts.mode,
            self.opts.conflict_limit,
        );
        let mut error = out.failure.map(|err| format!("{err:#}"));
        if let Err(err) = self.record(AuditAction::ArchiveSymlinks {
            archive_dir: archive_dir.display().to_string(),
            moved: moved_pairs(&out.moves),
        }) {
            error.get_or_insert_with(|| format!("{err:#}"));
        }
        if let Some(err_text) = &error {
            warn::emit(WarnEvent {
                code: "SYMLINK_ARCHIVE_FAILED",
                stage: "archive-symlinks",
                action: "move-symlinks",
                project: "na",
                path: &archive_dir.display().to_string(),
                reason: "partial-archive",
                err: err_text,
            });
        }
        SymlinkArchiveOutcome {
            archive_dir,
            moved: out.moves,
            error,
        }
    }

    pub fn run(self) -> Result<MigrationSummary> {
        let candidates = self.candidates();
        let mut plan = PlannedTree::default();
        let outcomes = candidates
            .iter()
            .map(|candidate| self.process_candidate(candidate, &mut plan))
            .collect();

        let symlinks = if self.opts.archive_symlinks && self.paths.projects_dir.is_dir() {
            Some(self.archive_project_symlinks())
        } else {
            None
        };

        Ok(MigrationSummary {
            mode: self.opts.mode,
            claude_dir: self.paths.claude_dir.clone(),
            projects_dir: self.paths.projects_dir.clone(),
            mappings: self.ledger.mapping.len(),
            manual_pairs: self.ledger.pair_records.len(),
            candidates: outcomes,
            symlinks,
            run_dir: self.run.as_ref().map(|run| run.dir.clone()),
            audit_log: self.run.as_ref().map(|run| run.audit.path().to_path_buf()),
            backup_root: self.run.as_ref().map(|run| run.backup_root.clone()),
        })
    }
}
