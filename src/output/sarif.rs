use std::collections::BTreeMap;

use crate::error::Result;
use crate::rules::{Finding, Severity};
use crate::ScanReport;

use serde_json::{json, Value};

/// Render a report as SARIF 2.1.0.
///
/// Produces a self-contained SARIF log compatible with GitHub Code Scanning
/// and other SARIF consumers. Suppressed findings, when included, carry a
/// SARIF `suppressions` entry.
pub fn render(report: &ScanReport, include_suppressed: bool) -> Result<String> {
    let findings = super::selected(report, include_suppressed);

    let mut by_rule: BTreeMap<&str, &Finding> = BTreeMap::new();
    for finding in findings.iter().copied() {
        by_rule.entry(finding.long_id.as_str()).or_insert(finding);
    }
    let rules: Vec<Value> = by_rule
        .values()
        .map(|finding| {
            json!({
                "id": finding.long_id,
                "name": finding.rule_id,
                "shortDescription": { "text": finding.rule_summary },
                "help": { "text": finding.resolution },
                "helpUri": finding.links.first(),
                "defaultConfiguration": {
                    "level": severity_to_sarif_level(finding.severity),
                },
                "properties": {
                    "provider": finding.provider,
                    "tags": ["security", finding.provider.as_str()],
                },
            })
        })
        .collect();

    let results: Vec<Value> = findings.iter().copied().map(result).collect();

    let notifications: Vec<Value> = report
        .rule_errors
        .iter()
        .map(|err| {
            json!({
                "level": "error",
                "message": { "text": err.to_string() },
                "descriptor": { "id": err.rule_id },
            })
        })
        .collect();

    let sarif = json!({
        "$schema": "https://docs.oasis-open.org/sarif/sarif/v2.1.0/errata01/os/schemas/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "tfguard",
                    "informationUri": "https://github.com/limaronaldo/tfguard",
                    "version": env!("CARGO_PKG_VERSION"),
                    "semanticVersion": env!("CARGO_PKG_VERSION"),
                    "rules": rules,
                },
            },
            "invocations": [{
                "executionSuccessful": report.is_success() && !report.cancelled,
                "endTimeUtc": report.scanned_at.to_rfc3339(),
                "toolExecutionNotifications": notifications,
            }],
            "results": results,
            "automationDetails": {
                "id": format!("tfguard/{}/", report.target_name),
                "guid": uuid::Uuid::new_v4().to_string(),
            },
        }],
    });

    let output = serde_json::to_string_pretty(&sarif)?;
    Ok(output)
}

fn result(f: &Finding) -> Value {
    let range = &f.range;
    let mut result = json!({
        "ruleId": f.long_id,
        "level": severity_to_sarif_level(f.severity),
        "message": { "text": f.description },
        "locations": [{
            "physicalLocation": {
                "artifactLocation": {
                    "uri": range.file.display().to_string(),
                },
                "region": {
                    "startLine": range.start_line,
                    "startColumn": range.start_column,
                    "endLine": range.end_line,
                    "endColumn": range.end_column,
                },
            },
        }],
        "properties": { "severity": f.severity },
    });

    if !f.resolution.is_empty() {
        result["fixes"] = json!([{
            "description": { "text": f.resolution },
        }]);
    }
    if f.suppressed {
        result["suppressions"] = json!([{
            "kind": "external",
            "justification": "excluded by configuration",
        }]);
    }
    result
}

fn severity_to_sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "note",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::{finding, report};

    fn parse(out: &str) -> Value {
        serde_json::from_str(out).unwrap()
    }

    #[test]
    fn emits_rules_and_results() {
        let r = report(vec![
            finding("a", Severity::Critical, 2, false),
            finding("a", Severity::Critical, 6, false),
            finding("b", Severity::Medium, 9, false),
        ]);
        let sarif = parse(&render(&r, false).unwrap());
        let run = &sarif["runs"][0];
        assert_eq!(sarif["version"], "2.1.0");
        assert_eq!(run["tool"]["driver"]["rules"].as_array().unwrap().len(), 2);
        assert_eq!(run["results"].as_array().unwrap().len(), 3);
        assert_eq!(run["results"][0]["ruleId"], "azure-security-center-a");
        assert_eq!(run["results"][0]["level"], "error");
        assert_eq!(run["results"][2]["level"], "warning");
        assert_eq!(
            run["results"][0]["locations"][0]["physicalLocation"]["region"]["startLine"],
            2
        );
        assert_eq!(run["invocations"][0]["executionSuccessful"], false);
        assert_eq!(
            run["invocations"][0]["toolExecutionNotifications"][0]["descriptor"]["id"],
            "broken"
        );
    }

    #[test]
    fn suppressed_results_are_marked_when_included() {
        let r = report(vec![finding("a", Severity::Low, 2, true)]);
        let hidden = parse(&render(&r, false).unwrap());
        assert!(hidden["runs"][0]["results"].as_array().unwrap().is_empty());

        let shown = parse(&render(&r, true).unwrap());
        let result = &shown["runs"][0]["results"][0];
        assert_eq!(result["level"], "note");
        assert_eq!(result["suppressions"][0]["kind"], "external");
    }
}
