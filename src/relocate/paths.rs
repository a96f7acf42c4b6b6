use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct MigratePaths {
    pub claude_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub migrations_dir: PathBuf,
}

impl MigratePaths {
    pub fn under(claude_dir: PathBuf) -> Self {
        Self {
            projects_dir: claude_dir.join("projects"),
            migrations_dir: claude_dir.join("_migrations"),
            claude_dir,
        }
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_claude_dir() -> Result<PathBuf> {
    match env::var("CLAUDE_CONFIG_DIR") {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Ok(required_home_dir()?.join(".claude")),
    }
}

pub fn resolve_paths() -> Result<MigratePaths> {
    let claude_dir = resolve_claude_dir()?;
    let defaults = MigratePaths::under(claude_dir.clone());

    let projects_dir = env_or_default_path("CCMIGRATE_PROJECTS_DIR", defaults.projects_dir);
    let migrations_dir =
        env_or_default_path("CCMIGRATE_MIGRATIONS_DIR", defaults.migrations_dir);

    Ok(MigratePaths {
        claude_dir,
        projects_dir,
        migrations_dir,
    })
}
