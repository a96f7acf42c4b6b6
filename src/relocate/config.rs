use crate::error::MigrateError;
use crate::relocate::paths::MigratePaths;
use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONFLICT_LIMIT: u32 = 9_999;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    pub moves: Option<PathBuf>,
    pub corrections: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub conflict_limit: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            conflict_limit: DEFAULT_CONFLICT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunConfig {
    pub stamp_timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrateConfig {
    pub ledger: LedgerConfig,
    pub merge: MergeConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialMigrateConfig {
    ledger: Option<LedgerConfig>,
    merge: Option<MergeConfig>,
    run: Option<RunConfig>,
}

impl MigrateConfig {
    pub fn moves_path(&self, paths: &MigratePaths) -> PathBuf {
        self.ledger
            .moves
            .clone()
            .unwrap_or_else(|| paths.claude_dir.join("moves.csv"))
    }

    pub fn corrections_path(&self, paths: &MigratePaths) -> PathBuf {
        self.ledger
            .corrections
            .clone()
            .unwrap_or_else(|| paths.claude_dir.join("moves_corrections.csv"))
    }

    pub fn stamp_timezone(&self) -> Option<Tz> {
        self.run
            .stamp_timezone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn env_string(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn validate(cfg: &MigrateConfig) -> Result<()> {
    if cfg.merge.conflict_limit == 0 {
        return Err(MigrateError::InvalidConfig(
            "merge.conflict_limit must be >= 1".to_string(),
        )
        .into());
    }
    if let Some(name) = cfg.run.stamp_timezone.as_deref()
        && name.parse::<Tz>().is_err()
    {
        return Err(MigrateError::InvalidConfig(format!(
            "run.stamp_timezone is not an IANA timezone: {name}"
        ))
        .into());
    }
    Ok(())
}

pub fn resolve_config_path(paths: &MigratePaths) -> PathBuf {
    env_path("CCMIGRATE_CONFIG_PATH").unwrap_or_else(|| paths.claude_dir.join("ccmigrate.toml"))
}

fn merge_file_config(base: &mut MigrateConfig, paths: &MigratePaths) -> Result<()> {
    let path = resolve_config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path).map_err(|err| {
        MigrateError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
    })?;
    let parsed: PartialMigrateConfig = toml::from_str(&raw).map_err(|err| {
        MigrateError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(ledger) = parsed.ledger {
        base.ledger = ledger;
    }
    if let Some(merge) = parsed.merge {
        base.merge = merge;
    }
    if let Some(run) = parsed.run {
        base.run = run;
    }
    Ok(())
}

pub fn load_config(paths: &MigratePaths) -> Result<MigrateConfig> {
    let mut cfg = MigrateConfig::default();
    merge_file_config(&mut cfg, paths)?;

    if let Some(moves) = env_path("CCMIGRATE_MOVES") {
        cfg.ledger.moves = Some(moves);
    }
    if let Some(corrections) = env_path("CCMIGRATE_CORRECTIONS") {
        cfg.ledger.corrections = Some(corrections);
    }
    cfg.merge.conflict_limit = env_or_u32("CCMIGRATE_CONFLICT_LIMIT", cfg.merge.conflict_limit);
    if let Some(tz) = env_string("CCMIGRATE_STAMP_TIMEZONE") {
        cfg.run.stamp_timezone = Some(tz);
    }

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_paths_default_under_claude_dir() {
        let paths = MigratePaths::under(PathBuf::from("/home/alice/.claude"));
        let cfg = MigrateConfig::default();
        assert_eq!(
            cfg.moves_path(&paths),
            PathBuf::from("/home/alice/.claude/moves.csv")
        );
        assert_eq!(
            cfg.corrections_path(&paths),
            PathBuf::from("/home/alice/.claude/moves_corrections.csv")
        );
    }

    #[test]
    fn partial_toml_keeps_unset_sections_at_default() {
        let parsed: PartialMigrateConfig = toml::from_str(
            "[ledger]\nmoves = \"/logs/moves.csv\"\n\n[run]\nstamp_timezone = \"Asia/Seoul\"\n",
        )
        .expect("parse");
        let mut cfg = MigrateConfig::default();
        if let Some(ledger) = parsed.ledger {
            cfg.ledger = ledger;
        }
        if let Some(run) = parsed.run {
            cfg.run = run;
        }
        assert!(parsed.merge.is_none());
        assert_eq!(cfg.merge.conflict_limit, DEFAULT_CONFLICT_LIMIT);
        assert_eq!(cfg.ledger.moves, Some(PathBuf::from("/logs/moves.csv")));
        assert_eq!(cfg.stamp_timezone(), Some(chrono_tz::Asia::Seoul));
    }

    #[test]
    fn validate_rejects_zero_conflict_limit_and_bad_timezone() {
        let mut cfg = MigrateConfig::default();
        cfg.merge.conflict_limit = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = MigrateConfig::default();
        cfg.run.stamp_timezone = Some("Mars/Olympus".to_string());
        assert!(validate(&cfg).is_err());

        assert!(validate(&MigrateConfig::default()).is_ok());
    }
}
