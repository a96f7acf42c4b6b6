pub mod audit;
pub mod candidates;
pub mod config;
pub mod drift;
pub mod encode;
pub mod history;
pub mod ledger;
pub mod merge;
pub mod paths;
pub mod plan;
pub mod rewrite;
pub mod session;
pub mod util;
pub mod warn;

use serde::Serialize;

/// Chosen once per invocation; a run never mixes modes across candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply { Self::Apply } else { Self::DryRun }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DryRun => "DRY-RUN",
            Self::Apply => "APPLY",
        }
    }
}
