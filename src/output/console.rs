use crate::rules::Severity;
use crate::ScanReport;

/// Render a report as console text, grouped by severity then file path.
pub fn render(report: &ScanReport, include_suppressed: bool) -> String {
    let mut output = String::new();
    let mut findings = super::selected(report, include_suppressed);

    if findings.is_empty() {
        output.push_str("\n  No problems detected.\n\n");
    } else {
        // Critical first, then file. Stable, so report order holds within a file.
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.range.file.cmp(&b.range.file))
        });

        output.push_str(&format!("\n  {} problem(s) detected:\n\n", findings.len()));

        for finding in &findings {
            let severity_tag = match finding.severity {
                Severity::Critical => "[CRITICAL]",
                Severity::High => "[HIGH]    ",
                Severity::Medium => "[MEDIUM]  ",
                Severity::Low => "[LOW]     ",
            };
            let suppressed = if finding.suppressed { " (suppressed)" } else { "" };

            output.push_str(&format!(
                "  {} {} {}{}\n",
                severity_tag, finding.long_id, finding.description, suppressed
            ));
            output.push_str(&format!("           at {}\n", finding.range));
            if let Some(annotation) = &finding.annotation {
                output.push_str(&format!("           {} = {}", annotation.name, annotation.raw));
                match &annotation.value {
                    Some(value) if !is_literal(&annotation.raw, value) => {
                        output.push_str(&format!("  (resolved: {value})\n"))
                    }
                    _ => output.push('\n'),
                }
            }
            if !finding.resolution.is_empty() {
                output.push_str(&format!("           fix: {}\n", finding.resolution));
            }
            if let Some(link) = finding.links.first() {
                output.push_str(&format!("           see: {link}\n"));
            }
            output.push('\n');
        }
    }

    if !report.rule_errors.is_empty() {
        output.push_str(&format!("  {} rule error(s):\n", report.rule_errors.len()));
        for err in &report.rule_errors {
            output.push_str(&format!("    {err}\n"));
        }
        output.push('\n');
    }
    if !report.model_errors.is_empty() {
        output.push_str(&format!("  {} file(s) skipped:\n", report.model_errors.len()));
        for err in &report.model_errors {
            output.push_str(&format!("    {err}\n"));
        }
        output.push('\n');
    }
    if report.cancelled {
        output.push_str("  Scan stopped early: results are partial.\n\n");
    }

    let verdict = &report.verdict;
    let status = if verdict.pass { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "  Result: {} (threshold: {}, highest: {}, suppressed: {})\n\n",
        status,
        verdict.fail_threshold,
        verdict
            .highest_severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".into()),
        verdict.suppressed_findings,
    ));

    output
}

/// True when the expression as written is the value itself, quoted or not.
fn is_literal(raw: &str, value: &str) -> bool {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    unquoted == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::{finding, report};

    #[test]
    fn lists_findings_worst_first() {
        let out = render(
            &report(vec![
                finding("low-one", Severity::Low, 2, false),
                finding("critical-one", Severity::Critical, 8, false),
            ]),
            false,
        );
        let critical = out.find("critical-one").unwrap();
        let low = out.find("low-one").unwrap();
        assert!(critical < low);
        assert!(out.contains("at infra/main.tf:2"));
        assert!(out.contains("tier = \"Free\"\n"));
        assert!(!out.contains("(resolved:"));
        assert!(out.contains("Result: FAIL"));
        assert!(out.contains("rule 'broken' failed"));
    }

    #[test]
    fn suppressed_findings_hidden_by_default() {
        let r = report(vec![finding("hidden", Severity::High, 2, true)]);
        let out = render(&r, false);
        assert!(!out.contains("hidden"));
        assert!(out.contains("No problems detected"));
        assert!(out.contains("suppressed: 1"));

        let out = render(&r, true);
        assert!(out.contains("hidden"));
        assert!(out.contains("(suppressed)"));
    }

    #[test]
    fn shows_resolved_value_of_references() {
        let mut f = finding("from-var", Severity::Low, 4, false);
        if let Some(annotation) = f.annotation.as_mut() {
            annotation.raw = "var.tier".into();
        }
        let out = render(&report(vec![f]), false);
        assert!(out.contains("tier = var.tier  (resolved: Free)"));
    }
}
