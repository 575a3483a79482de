pub mod builtin;
pub mod finding;
pub mod policy;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ResolutionContext;
use crate::model::{Block, BlockType};

pub use finding::{AnnotatedAttribute, Finding, Issue, ResultSet, RuleError, Severity};
pub use registry::{RegistryBuilder, RuleRegistry};

/// A rule body. Reads the block and context, reports issues into the set.
pub type CheckFn = fn(&mut ResultSet<'_>, &Block, &ResolutionContext<'_>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Google,
    /// Applies regardless of provider.
    General,
}

impl Provider {
    /// Provider owning a resource type, from its name prefix.
    pub fn from_type_label(label: &str) -> Option<Self> {
        let prefix = label.split('_').next().unwrap_or_default();
        match prefix {
            "aws" => Some(Self::Aws),
            "azurerm" | "azuread" | "azapi" => Some(Self::Azure),
            "google" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Google => "google",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleDocumentation {
    pub summary: &'static str,
    pub explanation: &'static str,
    pub impact: &'static str,
    pub resolution: &'static str,
    pub bad_examples: &'static [&'static str],
    pub good_examples: &'static [&'static str],
    pub links: &'static [&'static str],
}

/// A registered security check.
///
/// Applicability is declared as data: the scanner runs `check` only on
/// blocks whose provider, block type and type label pass the filters.
#[derive(Clone)]
pub struct Rule {
    pub provider: Provider,
    pub service: &'static str,
    pub short_code: &'static str,
    pub required_types: &'static [BlockType],
    /// Allowed first labels; a trailing `*` matches a prefix. Empty = any.
    pub required_labels: &'static [&'static str],
    pub default_severity: Severity,
    pub documentation: RuleDocumentation,
    pub check: CheckFn,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("provider", &self.provider)
            .field("service", &self.service)
            .field("short_code", &self.short_code)
            .field("required_types", &self.required_types)
            .field("required_labels", &self.required_labels)
            .field("default_severity", &self.default_severity)
            .finish()
    }
}

impl Rule {
    /// `<provider>-<service>-<short code>`.
    pub fn long_id(&self) -> String {
        format!("{}-{}-{}", self.provider, self.service, self.short_code)
    }

    /// Whether a configuration entry names this rule.
    pub fn is_named(&self, code: &str) -> bool {
        code == self.short_code || code == self.long_id()
    }

    /// Structural match only; values are the check's business.
    /// `provider` is the provider of the top-level block `block` sits in.
    pub fn applies_to(&self, block: &Block, provider: Option<Provider>) -> bool {
        if self.provider != Provider::General && provider != Some(self.provider) {
            return false;
        }
        if !self.required_types.is_empty() && !self.required_types.contains(&block.block_type()) {
            return false;
        }
        if self.required_labels.is_empty() {
            return true;
        }
        let label = match block.block_type() {
            BlockType::Nested => Some(block.ident()),
            _ => block.type_label(),
        };
        match label {
            Some(label) => self.required_labels.iter().any(|pattern| label_matches(pattern, label)),
            None => false,
        }
    }

    pub fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: self.short_code.to_string(),
            long_id: self.long_id(),
            provider: self.provider,
            service: self.service.to_string(),
            summary: self.documentation.summary.to_string(),
            default_severity: self.default_severity,
            required_types: self.required_types.to_vec(),
            required_labels: self.required_labels.iter().map(|l| l.to_string()).collect(),
            links: self.documentation.links.iter().map(|l| l.to_string()).collect(),
        }
    }
}

fn label_matches(pattern: &str, label: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => label.starts_with(prefix),
        None => pattern == label,
    }
}

/// Metadata about a rule, used for `list-rules` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub id: String,
    pub long_id: String,
    pub provider: Provider,
    pub service: String,
    pub summary: String,
    pub default_severity: Severity,
    pub required_types: Vec<BlockType>,
    pub required_labels: Vec<String>,
    pub links: Vec<String>,
}
