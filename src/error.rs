use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("move ledger not found: {} (and no --pair provided)", .0.display())]
    MissingLedger(PathBuf),
    #[error("too many conflicts while moving into {}", .0.display())]
    ConflictsExhausted(PathBuf),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("another migration run holds the lock at {}", .0.display())]
    RunLocked(PathBuf),
}
