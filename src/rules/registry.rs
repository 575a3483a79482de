use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use super::{builtin, Rule, RuleMetadata};
use crate::error::{Result, ScanError};

static KEBAB_CASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

#[derive(Debug, Default)]
struct Pending {
    rules: Vec<Rule>,
    by_code: HashMap<&'static str, usize>,
}

/// Collects rule definitions at startup.
///
/// `register` takes `&self` so rule packages may register from several
/// threads; the lock only exists while building. `build` hands back the
/// read-only `RuleRegistry` used during scans.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    pending: Mutex<Pending>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Fails if its short code or service is not kebab-case,
    /// or the short code is already taken.
    pub fn register(&self, rule: Rule) -> Result<()> {
        validate_name(rule.short_code, "short code", rule.short_code)?;
        validate_name(rule.service, "service", rule.short_code)?;

        let mut pending = self.pending.lock();
        if pending.by_code.contains_key(rule.short_code) {
            return Err(ScanError::DuplicateRule {
                short_code: rule.short_code.to_string(),
            });
        }
        let index = pending.rules.len();
        pending.by_code.insert(rule.short_code, index);
        pending.rules.push(rule);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(self) -> RuleRegistry {
        let pending = self.pending.into_inner();
        RuleRegistry {
            rules: pending.rules,
            by_code: pending.by_code,
        }
    }
}

fn validate_name(name: &str, what: &str, short_code: &str) -> Result<()> {
    if KEBAB_CASE.is_match(name) {
        return Ok(());
    }
    let message = if name.trim().is_empty() {
        format!("{what} must not be empty")
    } else {
        format!("{what} '{name}' must be lowercase kebab-case")
    };
    Err(ScanError::InvalidRule {
        short_code: short_code.to_string(),
        message,
    })
}

/// Immutable rule catalog, in registration order.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    by_code: HashMap<&'static str, usize>,
}

impl RuleRegistry {
    /// Registry holding every built-in rule package.
    pub fn builtin() -> Result<Self> {
        let builder = RegistryBuilder::new();
        builtin::register_all(&builder)?;
        Ok(builder.build())
    }

    pub fn all_rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look a rule up by short code or long id.
    pub fn get(&self, code: &str) -> Option<&Rule> {
        match self.by_code.get(code) {
            Some(&index) => Some(&self.rules[index]),
            None => self.rules.iter().find(|r| r.long_id() == code),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// List metadata for all registered rules.
    pub fn list_rules(&self) -> Vec<RuleMetadata> {
        self.rules.iter().map(Rule::metadata).collect()
    }
}
