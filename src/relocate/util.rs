use anyhow::{Context, Result};
use chrono::{Local, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const RUN_STAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Wall-clock stamp naming a migration run, e.g. `2025-12-15_001817`.
pub fn run_stamp(tz: Option<Tz>) -> String {
    match tz {
        Some(tz) => Utc::now().with_timezone(&tz).format(RUN_STAMP_FORMAT).to_string(),
        None => Local::now().format(RUN_STAMP_FORMAT).to_string(),
    }
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
