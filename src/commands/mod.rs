pub mod drift;
pub mod encode;
pub mod migrate;
pub mod runs;
pub mod status;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Machine-readable payload shown with `--json`.
    pub fn attach<T: Serialize>(&mut self, data: &T) -> Result<()> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(())
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for line in &self.details {
            out.push_str(line);
            out.push('\n');
        }
        for issue in &self.issues {
            out.push_str("issue: ");
            out.push_str(issue);
            out.push('\n');
        }
        out
    }
}
