use anyhow::Result;
use serde::Serialize;

use crate::commands::CommandReport;
use crate::relocate::encode::encode_project_path;

#[derive(Debug, Clone, Serialize)]
struct EncodedPath {
    path: String,
    encoded: String,
}

pub fn run(paths: &[String]) -> Result<CommandReport> {
    let mut report = CommandReport::new("encode");
    let mut encoded = Vec::with_capacity(paths.len());
    for path in paths {
        let out = encode_project_path(path);
        report.detail(out.clone());
        encoded.push(EncodedPath {
            path: path.clone(),
            encoded: out,
        });
    }
    report.attach(&encoded)?;
    Ok(report)
}
