use crate::context::ResolutionContext;
use crate::model::{Block, BlockType};
use crate::rules::{Issue, Provider, ResultSet, Rule, RuleDocumentation, Severity};

pub(super) fn enforce_https() -> Rule {
    Rule {
        provider: Provider::Azure,
        service: "storage",
        short_code: "enforce-https",
        required_types: &[BlockType::Resource],
        required_labels: &["azurerm_storage_account"],
        default_severity: Severity::High,
        documentation: RuleDocumentation {
            summary: "Storage accounts should only accept HTTPS traffic",
            explanation: "With HTTPS-only traffic disabled, clients may reach the storage \
                account over plain HTTP and data in transit is readable on the wire.",
            impact: "Data in transit may be intercepted",
            resolution: "Leave enable_https_traffic_only unset or set it to true",
            bad_examples: &[r#"
resource "azurerm_storage_account" "bad_example" {
  name                      = "storageaccountname"
  enable_https_traffic_only = false
}
"#],
            good_examples: &[r#"
resource "azurerm_storage_account" "good_example" {
  name                      = "storageaccountname"
  enable_https_traffic_only = true
}
"#],
            links: &[
                "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/storage_account#enable_https_traffic_only",
                "https://docs.microsoft.com/en-us/azure/storage/common/storage-require-secure-transfer",
            ],
        },
        check,
    }
}

// Absent means the provider default, which is HTTPS only.
fn check(results: &mut ResultSet<'_>, block: &Block, _ctx: &ResolutionContext<'_>) {
    if let Some(attr) = block.get_attribute("enable_https_traffic_only") {
        if attr.is_false() {
            results.add(
                Issue::new(block)
                    .description(format!(
                        "Resource '{}' explicitly turns off secure transfer to storage account.",
                        block.full_name()
                    ))
                    .attribute(attr),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::check_source;

    #[test]
    fn flags_disabled_https() {
        let findings = check_source(
            &enforce_https(),
            r#"
resource "azurerm_storage_account" "bad" {
  enable_https_traffic_only = false
}
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].range.start_line, 3);
    }

    #[test]
    fn default_and_enabled_pass() {
        let rule = enforce_https();
        assert!(check_source(&rule, "resource \"azurerm_storage_account\" \"a\" {}\n").is_empty());
        assert!(check_source(
            &rule,
            "resource \"azurerm_storage_account\" \"a\" {\n  enable_https_traffic_only = true\n}\n"
        )
        .is_empty());
    }

    #[test]
    fn flags_value_from_local() {
        let findings = check_source(
            &enforce_https(),
            r#"
locals {
  https = false
}

resource "azurerm_storage_account" "bad" {
  enable_https_traffic_only = local.https
}
"#,
        );
        assert_eq!(findings.len(), 1);
    }
}
