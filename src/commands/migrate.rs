use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::relocate::RunMode;
use crate::relocate::config::load_config;
use crate::relocate::ledger::LedgerSources;
use crate::relocate::paths::resolve_paths;
use crate::relocate::session::{MigrationOptions, MigrationSession, MigrationSummary};
use crate::relocate::util::run_stamp;

const RULE: &str =
    "================================================================================";

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub moves: Option<PathBuf>,
    pub corrections: Option<PathBuf>,
    pub pairs: Vec<(String, String)>,
    pub apply: bool,
    pub archive_project_symlinks: bool,
}

fn describe(report: &mut CommandReport, summary: &MigrationSummary) {
    report.detail(format!("Claude dir: {}", summary.claude_dir.display()));
    report.detail(format!("Projects dir: {}", summary.projects_dir.display()));
    report.detail(format!("Mode: {}", summary.mode.label()));
    report.detail(format!(
        "Move mappings loaded: {} (dir-only)",
        summary.mappings
    ));
    if summary.manual_pairs > 0 {
        report.detail(format!("Manual pairs: {}", summary.manual_pairs));
    }
    report.detail(format!(
        "Migration candidates (existing old project dirs): {}",
        summary.candidates.len()
    ));

    for candidate in &summary.candidates {
        report.detail("");
        report.detail(RULE);
        report.detail(format!("SRC: {}", candidate.old_path));
        report.detail(format!("DST: {}", candidate.new_path));
        report.detail(format!("OLD: {}", candidate.old_dir.display()));
        report.detail(format!("NEW: {}", candidate.new_dir.display()));
        if candidate.merge_skipped {
            report.detail("Old and new paths share one project dir; merge skipped.");
        } else {
            report.detail(format!("Moved entries: {}", candidate.moved.len()));
        }
        report.detail(format!(
            "Rewritten jsonl files (cwd updates): {}",
            candidate.rewritten.len()
        ));
        if candidate.removed_old_dir {
            report.detail("Removed empty old project dir.");
        }
        if let Some(note) = &candidate.cleanup_note {
            report.detail(note.clone());
        }
        if let Some(err) = &candidate.error {
            report.detail(format!("FAILED: {err}"));
        }
    }

    if let Some(symlinks) = &summary.symlinks {
        report.detail("");
        report.detail(RULE);
        report.detail(format!("Symlinks archived: {}", symlinks.moved.len()));
        report.detail(format!("Archive dir: {}", symlinks.archive_dir.display()));
        if let Some(err) = &symlinks.error {
            report.detail(format!("FAILED: {err}"));
        }
    }

    report.detail("");
    let failed = summary.failed_candidates();
    if failed > 0 {
        report.detail(format!(
            "Done with {failed} failed candidate(s); re-run after fixing them."
        ));
    } else {
        report.detail("Done.");
    }
    match (&summary.audit_log, &summary.backup_root) {
        (Some(log), Some(backups)) => {
            report.detail(format!("Migration log: {}", log.display()));
            report.detail(format!("Backups: {}", backups.display()));
        }
        _ => report.detail("Re-run with --apply to make changes."),
    }
}

pub fn run(opts: &MigrateOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let mut report = CommandReport::new("migrate");

    let sources = LedgerSources {
        moves: opts.moves.clone().unwrap_or_else(|| cfg.moves_path(&paths)),
        corrections: opts
            .corrections
            .clone()
            .unwrap_or_else(|| cfg.corrections_path(&paths)),
        pairs: opts.pairs.clone(),
    };
    let session_opts = MigrationOptions {
        mode: RunMode::from_apply_flag(opts.apply),
        sources,
        archive_symlinks: opts.archive_project_symlinks,
        conflict_limit: cfg.merge.conflict_limit,
        stamp: run_stamp(cfg.stamp_timezone()),
    };

    let summary = MigrationSession::prepare(paths, session_opts)?.run()?;
    describe(&mut report, &summary);
    report.attach(&summary)?;
    Ok(report)
}
