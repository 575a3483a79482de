use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Provider, Rule};
use crate::error::ScanError;
use crate::model::{Attribute, Block};
use crate::syntax::SourceRange;

/// A security finding produced by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule short code (e.g., "enable-standard-subscription").
    pub rule_id: String,
    /// Provider-qualified rule id (e.g., "azure-security-center-enable-standard-subscription").
    pub long_id: String,
    pub provider: Provider,
    /// One-line rule summary.
    pub rule_summary: String,
    /// Human-readable description of this occurrence.
    pub description: String,
    pub range: SourceRange,
    /// Starts as the rule default; the policy overlay may replace it.
    pub severity: Severity,
    /// Attribute to highlight when rendering a snippet.
    pub annotation: Option<AnnotatedAttribute>,
    pub impact: String,
    pub resolution: String,
    pub links: Vec<String>,
    /// Set by the exclusion overlay. Suppressed findings are kept for
    /// counting but hidden from default output.
    #[serde(default)]
    pub suppressed: bool,
}

impl Finding {
    /// Identity used for de-duplication.
    pub fn key(&self) -> (&str, &SourceRange) {
        (&self.rule_id, &self.range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedAttribute {
    pub name: String,
    /// Expression as written.
    pub raw: String,
    /// Resolved value, when known.
    pub value: Option<String>,
    pub range: SourceRange,
}

impl From<&Attribute> for AnnotatedAttribute {
    fn from(attr: &Attribute) -> Self {
        Self {
            name: attr.name().to_string(),
            raw: attr.raw().to_string(),
            value: attr
                .value()
                .map(|v| v.interpolate().unwrap_or_else(|| v.to_string())),
            range: attr.range().clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Normalize a severity token from a user config file. The legacy
    /// tokens ERROR, WARNING and INFO map to HIGH, MEDIUM and LOW; anything
    /// else is rejected.
    pub fn from_config_token(rule: &str, token: &str) -> Result<Self, ScanError> {
        if let Some(severity) = Self::from_str_lenient(token) {
            return Ok(severity);
        }
        match token.to_uppercase().as_str() {
            "ERROR" => Ok(Self::High),
            "WARNING" => Ok(Self::Medium),
            "INFO" => Ok(Self::Low),
            _ => Err(ScanError::UnknownSeverity {
                rule: rule.to_string(),
                token: token.to_string(),
            }),
        }
    }
}

impl FromStr for Severity {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_lenient(s).ok_or_else(|| ScanError::Config(format!("unknown severity '{s}'")))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A finding as reported by a check function, before the rule's metadata
/// is attached.
#[derive(Debug, Clone)]
pub struct Issue {
    description: Option<String>,
    range: SourceRange,
    annotation: Option<AnnotatedAttribute>,
}

impl Issue {
    /// Issue located at `block`.
    pub fn new(block: &Block) -> Self {
        Self {
            description: None,
            range: block.range().clone(),
            annotation: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn range(mut self, range: &SourceRange) -> Self {
        self.range = range.clone();
        self
    }

    /// Point the issue at `attr` and keep it for snippet rendering.
    pub fn attribute(mut self, attr: &Attribute) -> Self {
        self.range = attr.range().clone();
        self.annotation = Some(attr.into());
        self
    }
}

/// Collects the issues one rule reports for one block.
#[derive(Debug)]
pub struct ResultSet<'r> {
    rule: &'r Rule,
    findings: Vec<Finding>,
}

impl<'r> ResultSet<'r> {
    pub fn new(rule: &'r Rule) -> Self {
        Self {
            rule,
            findings: Vec::new(),
        }
    }

    pub fn add(&mut self, issue: Issue) {
        let rule = self.rule;
        let doc = &rule.documentation;
        self.findings.push(Finding {
            rule_id: rule.short_code.to_string(),
            long_id: rule.long_id(),
            provider: rule.provider,
            rule_summary: doc.summary.to_string(),
            description: issue.description.unwrap_or_else(|| doc.summary.to_string()),
            range: issue.range,
            severity: rule.default_severity,
            annotation: issue.annotation,
            impact: doc.impact.to_string(),
            resolution: doc.resolution.to_string(),
            links: doc.links.iter().map(|l| l.to_string()).collect(),
            suppressed: false,
        });
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

/// A check function that failed while running against a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleError {
    pub rule_id: String,
    pub block: String,
    pub range: SourceRange,
    pub message: String,
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule '{}' failed on {} at {}: {}",
            self.rule_id, self.block, self.range, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_tokens_accept_canonical_levels_in_any_case() {
        assert_eq!(Severity::from_config_token("r", "critical").unwrap(), Severity::Critical);
        assert_eq!(Severity::from_config_token("r", "High").unwrap(), Severity::High);
        assert_eq!(Severity::from_config_token("r", "MEDIUM").unwrap(), Severity::Medium);
        assert_eq!(Severity::from_config_token("r", "low").unwrap(), Severity::Low);
    }

    #[test]
    fn config_tokens_rewrite_legacy_levels() {
        assert_eq!(Severity::from_config_token("r", "ERROR").unwrap(), Severity::High);
        assert_eq!(Severity::from_config_token("r", "warning").unwrap(), Severity::Medium);
        assert_eq!(Severity::from_config_token("r", "Info").unwrap(), Severity::Low);
    }

    #[test]
    fn config_tokens_reject_anything_else() {
        let err = Severity::from_config_token("my-rule", "SEVERE").unwrap_err();
        match err {
            ScanError::UnknownSeverity { rule, token } => {
                assert_eq!(rule, "my-rule");
                assert_eq!(token, "SEVERE");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
    }
}
