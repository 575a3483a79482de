use crate::error::Result;
use crate::rules::policy::PolicyVerdict;
use crate::rules::{Finding, RuleError};
use crate::model::ModelError;
use crate::ScanReport;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    target: &'a str,
    scanned_at: &'a DateTime<Utc>,
    success: bool,
    cancelled: bool,
    findings: &'a [Finding],
    rule_errors: &'a [RuleError],
    model_errors: &'a [ModelError],
    verdict: &'a PolicyVerdict,
}

/// Render a report as JSON. Suppressed findings are included and tagged.
pub fn render(report: &ScanReport) -> Result<String> {
    let json = JsonReport {
        target: &report.target_name,
        scanned_at: &report.scanned_at,
        success: report.is_success(),
        cancelled: report.cancelled,
        findings: &report.findings,
        rule_errors: &report.rule_errors,
        model_errors: &report.model_errors,
        verdict: &report.verdict,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}
