pub mod console;
pub mod json;
pub mod sarif;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::Finding;
use crate::ScanReport;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
    Sarif,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            "sarif" => Some(Self::Sarif),
            _ => None,
        }
    }
}

/// Render a report into the specified format. JSON always carries
/// suppressed findings, tagged; the other formats only when asked.
pub fn render(report: &ScanReport, format: OutputFormat, include_suppressed: bool) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(report, include_suppressed)),
        OutputFormat::Json => json::render(report),
        OutputFormat::Sarif => sarif::render(report, include_suppressed),
    }
}

fn selected(report: &ScanReport, include_suppressed: bool) -> Vec<&Finding> {
    report
        .findings
        .iter()
        .filter(|f| include_suppressed || !f.suppressed)
        .collect()
}
