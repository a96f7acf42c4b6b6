use anyhow::Result;

use crate::commands::CommandReport;
use crate::relocate::drift::{DriftStatus, scan_projects};
use crate::relocate::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("drift");
    report.detail(format!("projects_dir={}", paths.projects_dir.display()));

    if !paths.projects_dir.is_dir() {
        report.issue("projects dir does not exist");
        return Ok(report);
    }

    let projects = scan_projects(&paths.projects_dir)?;
    let count = |status: DriftStatus| projects.iter().filter(|p| p.status == status).count();
    report.detail(format!("projects={}", projects.len()));
    report.detail(format!("ok={}", count(DriftStatus::Ok)));
    report.detail(format!("moved={}", count(DriftStatus::Moved)));
    report.detail(format!("mismatch={}", count(DriftStatus::Mismatch)));
    report.detail(format!("unknown={}", count(DriftStatus::Unknown)));

    for project in projects.iter().filter(|p| p.status != DriftStatus::Ok) {
        let cwd = project.cwd.as_deref().unwrap_or("<none>");
        match &project.expected_dir {
            Some(expected) if project.status == DriftStatus::Mismatch => report.detail(format!(
                "{} dir={} cwd={} expected_dir={}",
                project.status.as_str(),
                project.dir_name,
                cwd,
                expected
            )),
            _ => report.detail(format!(
                "{} dir={} cwd={}",
                project.status.as_str(),
                project.dir_name,
                cwd
            )),
        }
    }

    report.attach(&projects)?;
    Ok(report)
}
