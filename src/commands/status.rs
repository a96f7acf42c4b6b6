use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::relocate::config::{load_config, resolve_config_path};
use crate::relocate::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/env_reads.rs"));

/// Environment keys this build reads that are currently set, with the
/// source files that read them.
fn env_overrides() -> Vec<(&'static str, &'static str)> {
    ENV_READS
        .iter()
        .copied()
        .filter(|(key, _)| env::var(key).is_ok_and(|v| !v.trim().is_empty()))
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    report.detail(format!("claude_dir={}", paths.claude_dir.display()));
    report.detail(format!("projects_dir={}", paths.projects_dir.display()));
    report.detail(format!("migrations_dir={}", paths.migrations_dir.display()));

    let config_path = resolve_config_path(&paths);
    report.detail(format!(
        "config_path={} (present={})",
        config_path.display(),
        config_path.exists()
    ));

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };

    let moves = cfg.moves_path(&paths);
    let corrections = cfg.corrections_path(&paths);
    report.detail(format!(
        "ledger.moves={} (present={})",
        moves.display(),
        moves.is_file()
    ));
    report.detail(format!(
        "ledger.corrections={} (present={})",
        corrections.display(),
        corrections.is_file()
    ));
    report.detail(format!("merge.conflict_limit={}", cfg.merge.conflict_limit));
    report.detail(format!(
        "run.stamp_timezone={}",
        cfg.run.stamp_timezone.as_deref().unwrap_or("local")
    ));

    let overrides = env_overrides();
    if overrides.is_empty() {
        report.detail("env_overrides=none");
    } else {
        let keys: Vec<&str> = overrides.iter().map(|(key, _)| *key).collect();
        report.detail(format!("env_overrides={}", keys.join(",")));
        for (key, readers) in &overrides {
            report.detail(format!("env.{key} read_by={readers}"));
        }
    }

    if !paths.projects_dir.is_dir() {
        report.issue(format!(
            "missing projects dir ({})",
            paths.projects_dir.display()
        ));
    }
    if !moves.is_file() {
        report.issue("move ledger not found; pass --moves or --pair to migrate");
    }

    report.attach(&cfg)?;
    Ok(report)
}
