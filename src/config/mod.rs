use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::rules::{RuleRegistry, Severity};

/// Directory searched for a config file when none is given explicitly.
pub const CONFIG_DIR: &str = ".tfguard";

const CONFIG_NAMES: [&str; 4] = ["config.json", "config.yml", "config.yaml", "config.toml"];

/// User configuration, with every severity already normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Rule codes to suppress.
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    /// Minimum severity that fails the scan.
    #[serde(default)]
    pub fail_on: Option<Severity>,
}

/// File layout, before severity tokens are checked.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    severity_overrides: BTreeMap<String, String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    fail_on: Option<String>,
}

/// A configured rule code that matches no registered rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCheck {
    pub code: String,
    pub suggestion: Option<String>,
}

impl Config {
    /// Load config from a JSON, YAML or TOML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let raw: RawConfig = match ext.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| load_error(path, e))?,
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| load_error(path, e))?,
            "toml" => toml::from_str(&content).map_err(|e| load_error(path, e))?,
            _ => {
                return Err(ScanError::Config(format!(
                    "couldn't process the file {}",
                    path.display()
                )))
            }
        };

        let config = Self::from_raw(raw)?;
        tracing::debug!(
            path = %path.display(),
            overrides = config.severity_overrides.len(),
            excluded = config.exclude.len(),
            "loaded config"
        );
        Ok(config)
    }

    /// First config file found under `<dir>/.tfguard/`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let base = dir.join(CONFIG_DIR);
        CONFIG_NAMES
            .iter()
            .map(|name| base.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let mut severity_overrides = BTreeMap::new();
        for (rule, token) in raw.severity_overrides {
            let severity = Severity::from_config_token(&rule, &token)?;
            severity_overrides.insert(rule, severity);
        }
        let fail_on = raw
            .fail_on
            .map(|token| Severity::from_config_token("fail_on", &token))
            .transpose()?;

        Ok(Self {
            severity_overrides,
            exclude: raw.exclude.into_iter().collect(),
            fail_on,
        })
    }

    /// Codes referenced by this config that no registered rule answers to,
    /// each with the closest registered short code when one is near.
    pub fn unknown_checks(&self, registry: &RuleRegistry) -> Vec<UnknownCheck> {
        let referenced: BTreeSet<&String> = self
            .exclude
            .iter()
            .chain(self.severity_overrides.keys())
            .collect();

        referenced
            .into_iter()
            .filter(|code| !registry.contains(code))
            .map(|code| UnknownCheck {
                code: code.clone(),
                suggestion: closest_rule(code, registry),
            })
            .collect()
    }

    /// Generate a starter config file.
    pub fn starter_yaml() -> &'static str {
        r#"# tfguard configuration

# Per-rule severity overrides (CRITICAL, HIGH, MEDIUM, LOW).
# ERROR, WARNING and INFO are accepted and mapped to HIGH, MEDIUM and LOW.
severity_overrides:
#  enable-standard-subscription: CRITICAL

# Rule codes whose findings are suppressed.
exclude:
#  - no-public-access-with-acl

# Minimum severity that fails the scan.
# fail_on: LOW
"#
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> ScanError {
    ScanError::Config(format!("failed to load config file '{}': {e}", path.display()))
}

fn closest_rule(code: &str, registry: &RuleRegistry) -> Option<String> {
    registry
        .all_rules()
        .iter()
        .map(|rule| (levenshtein::levenshtein(code, rule.short_code), rule.short_code))
        .filter(|(distance, _)| *distance <= 3)
        .min()
        .map(|(_, name)| name.to_string())
}
