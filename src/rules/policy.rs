use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Finding, RuleRegistry, Severity};
use crate::config::Config;

/// Policy verdict: the pass/fail decision after applying the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub pass: bool,
    pub total_findings: usize,
    pub effective_findings: usize,
    pub suppressed_findings: usize,
    pub highest_severity: Option<Severity>,
    pub fail_threshold: Severity,
}

/// Severity overrides and exclusions from user configuration, applied to
/// raw findings as the last step of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Minimum severity to fail the scan.
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
    /// Rule codes whose findings are suppressed.
    #[serde(default)]
    pub excluded_checks: BTreeSet<String>,
    /// Per-rule severity overrides.
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, Severity>,
}

fn default_fail_on() -> Severity {
    Severity::Low
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            excluded_checks: BTreeSet::new(),
            severity_overrides: BTreeMap::new(),
        }
    }
}

impl Policy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fail_on: config.fail_on.unwrap_or_else(default_fail_on),
            excluded_checks: config.exclude.clone(),
            severity_overrides: config.severity_overrides.clone(),
        }
    }

    /// Rewrite long ids in the overlay to short codes so lookups only need
    /// one key.
    pub fn canonicalize(mut self, registry: &RuleRegistry) -> Self {
        let canonical = |code: &String| {
            registry
                .get(code)
                .map(|rule| rule.short_code.to_string())
                .unwrap_or_else(|| code.clone())
        };
        self.excluded_checks = self.excluded_checks.iter().map(canonical).collect();
        self.severity_overrides = self
            .severity_overrides
            .iter()
            .map(|(code, severity)| (canonical(code), *severity))
            .collect();
        self
    }

    fn override_for(&self, finding: &Finding) -> Option<Severity> {
        self.severity_overrides
            .get(&finding.rule_id)
            .or_else(|| self.severity_overrides.get(&finding.long_id))
            .copied()
    }

    fn excludes(&self, finding: &Finding) -> bool {
        self.excluded_checks.contains(&finding.rule_id)
            || self.excluded_checks.contains(&finding.long_id)
    }

    /// Deduplicate, apply overrides and exclusions, and sort by
    /// (file, line, column, rule). The output does not depend on the order
    /// of `raw`.
    pub fn finalize(&self, raw: Vec<Finding>) -> Vec<Finding> {
        let mut findings = raw;
        findings.sort_by(|a, b| {
            (&a.range.file, a.range.start_line, a.range.start_column, &a.rule_id)
                .cmp(&(&b.range.file, b.range.start_line, b.range.start_column, &b.rule_id))
                .then_with(|| a.range.cmp(&b.range))
                .then_with(|| b.severity.cmp(&a.severity))
                .then_with(|| a.description.cmp(&b.description))
        });
        findings.dedup_by(|later, earlier| later.key() == earlier.key());

        for finding in &mut findings {
            if let Some(severity) = self.override_for(finding) {
                finding.severity = severity;
            }
            if self.excludes(finding) {
                finding.suppressed = true;
            }
        }
        findings
    }

    /// Evaluate finalized findings against this policy.
    pub fn evaluate(&self, findings: &[Finding]) -> PolicyVerdict {
        let effective: Vec<Severity> = findings
            .iter()
            .filter(|f| !f.suppressed)
            .map(|f| f.severity)
            .collect();

        let highest = effective.iter().copied().max();
        let failed = effective.iter().any(|&sev| sev >= self.fail_on);

        PolicyVerdict {
            pass: !failed,
            total_findings: findings.len(),
            effective_findings: effective.len(),
            suppressed_findings: findings.len() - effective.len(),
            highest_severity: highest,
            fail_threshold: self.fail_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Provider;
    use crate::syntax::SourceRange;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn make_finding(rule_id: &str, severity: Severity, file: &str, line: usize) -> Finding {
        Finding {
            rule_id: rule_id.into(),
            long_id: format!("azure-test-{rule_id}"),
            provider: Provider::Azure,
            rule_summary: "Test".into(),
            description: "test".into(),
            range: SourceRange::new(file, line, 3, line, 20),
            severity,
            annotation: None,
            impact: String::new(),
            resolution: String::new(),
            links: vec![],
            suppressed: false,
        }
    }

    #[test]
    fn default_policy_fails_on_any_finding() {
        let policy = Policy::default();
        let findings = policy.finalize(vec![make_finding("a", Severity::Low, "main.tf", 1)]);
        assert!(!policy.evaluate(&findings).pass);
    }

    #[test]
    fn threshold_passes_lower_severities() {
        let policy = Policy {
            fail_on: Severity::High,
            ..Default::default()
        };
        let findings = policy.finalize(vec![make_finding("a", Severity::Medium, "main.tf", 1)]);
        assert!(policy.evaluate(&findings).pass);
    }

    #[test]
    fn exclusion_suppresses_but_keeps_finding() {
        let mut policy = Policy::default();
        policy.excluded_checks.insert("a".into());
        let findings = policy.finalize(vec![make_finding("a", Severity::Critical, "main.tf", 1)]);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].suppressed);
        let verdict = policy.evaluate(&findings);
        assert!(verdict.pass);
        assert_eq!(verdict.effective_findings, 0);
        assert_eq!(verdict.suppressed_findings, 1);
    }

    #[test]
    fn exclusion_by_long_id() {
        let mut policy = Policy::default();
        policy.excluded_checks.insert("azure-test-a".into());
        let findings = policy.finalize(vec![make_finding("a", Severity::Low, "main.tf", 1)]);
        assert!(findings[0].suppressed);
    }

    #[test]
    fn override_replaces_severity() {
        let mut policy = Policy::default();
        policy.severity_overrides.insert("a".into(), Severity::Critical);
        let findings = policy.finalize(vec![make_finding("a", Severity::Low, "main.tf", 1)]);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn duplicates_collapse() {
        let policy = Policy::default();
        let findings = policy.finalize(vec![
            make_finding("a", Severity::Low, "main.tf", 4),
            make_finding("a", Severity::Low, "main.tf", 4),
            make_finding("b", Severity::Low, "main.tf", 4),
        ]);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn sorted_by_file_line_then_rule() {
        let policy = Policy::default();
        let findings = policy.finalize(vec![
            make_finding("b", Severity::Low, "b.tf", 1),
            make_finding("z", Severity::Low, "a.tf", 9),
            make_finding("b", Severity::Low, "a.tf", 2),
            make_finding("a", Severity::Low, "a.tf", 2),
        ]);
        let order: Vec<_> = findings
            .iter()
            .map(|f| format!("{}:{}:{}", f.range.file.display(), f.range.start_line, f.rule_id))
            .collect();
        assert_eq!(order, vec!["a.tf:2:a", "a.tf:2:b", "a.tf:9:z", "b.tf:1:b"]);
    }

    fn arb_finding() -> impl Strategy<Value = Finding> {
        (
            prop::sample::select(vec!["a", "b", "c"]),
            prop::sample::select(Severity::ALL.to_vec()),
            prop::sample::select(vec!["main.tf", "net.tf"]),
            1usize..6,
        )
            .prop_map(|(rule, severity, file, line)| make_finding(rule, severity, file, line))
    }

    fn arb_policy() -> impl Strategy<Value = Policy> {
        (
            prop::collection::btree_set(prop::sample::select(vec!["a", "b", "c"]), 0..3),
            prop::collection::btree_map(
                prop::sample::select(vec!["a", "b", "c"]),
                prop::sample::select(Severity::ALL.to_vec()),
                0..3,
            ),
        )
            .prop_map(|(excluded, overrides)| Policy {
                fail_on: Severity::Low,
                excluded_checks: excluded.into_iter().map(String::from).collect(),
                severity_overrides: overrides
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn finalize_ignores_input_order(
            findings in prop::collection::vec(arb_finding(), 0..12),
            policy in arb_policy(),
        ) {
            let mut reversed = findings.clone();
            reversed.reverse();
            prop_assert_eq!(policy.finalize(findings), policy.finalize(reversed));
        }

        #[test]
        fn overlay_is_idempotent(
            findings in prop::collection::vec(arb_finding(), 0..12),
            policy in arb_policy(),
        ) {
            let once = policy.finalize(findings);
            let twice = policy.finalize(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn excluded_codes_are_never_visible(
            findings in prop::collection::vec(arb_finding(), 0..12),
            policy in arb_policy(),
        ) {
            for f in policy.finalize(findings) {
                if policy.excluded_checks.contains(&f.rule_id) {
                    prop_assert!(f.suppressed);
                }
            }
        }
    }
}
