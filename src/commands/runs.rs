use anyhow::Result;

use crate::commands::CommandReport;
use crate::relocate::history::list_runs;
use crate::relocate::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("runs");
    report.detail(format!(
        "migrations_dir={}",
        paths.migrations_dir.display()
    ));

    let runs = list_runs(&paths.migrations_dir)?;
    report.detail(format!("runs={}", runs.len()));
    for run in &runs {
        if !run.has_log {
            report.detail(format!("{} actions=0 (no audit log)", run.name));
            continue;
        }
        let breakdown = run
            .actions
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        report.detail(format!(
            "{} actions={} {}",
            run.name,
            run.total_actions(),
            breakdown
        ));
    }

    report.attach(&runs)?;
    Ok(report)
}
