use crate::context::ResolutionContext;
use crate::model::{Block, BlockType, Case};
use crate::rules::{Issue, Provider, ResultSet, Rule, RuleDocumentation, Severity};

/// Security center pricing left on the free tier, which leaves Azure
/// Defender disabled for that resource type.
pub(super) fn enable_standard_subscription() -> Rule {
    Rule {
        provider: Provider::Azure,
        service: "security-center",
        short_code: "enable-standard-subscription",
        required_types: &[BlockType::Resource],
        required_labels: &["azurerm_security_center_subscription_pricing"],
        default_severity: Severity::Low,
        documentation: RuleDocumentation {
            summary: "Enable the standard security center subscription tier",
            explanation: "Azure Defender is only available on the Standard subscription tier. \
                It extends the free tier to workloads in private and other public clouds, \
                giving unified security management and threat protection across hybrid workloads.",
            impact: "Using free subscription does not enable Azure Defender for the resource type",
            resolution: "Enable standard subscription tier to benefit from Azure Defender",
            bad_examples: &[r#"
resource "azurerm_security_center_subscription_pricing" "bad_example" {
  tier          = "Free"
  resource_type = "VirtualMachines"
}
"#],
            good_examples: &[r#"
resource "azurerm_security_center_subscription_pricing" "good_example" {
  tier          = "Standard"
  resource_type = "VirtualMachines"
}
"#],
            links: &[
                "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/security_center_subscription_pricing#tier",
                "https://docs.microsoft.com/en-us/azure/security-center/security-center-pricing",
            ],
        },
        check,
    }
}

fn check(results: &mut ResultSet<'_>, block: &Block, _ctx: &ResolutionContext<'_>) {
    let Some(tier) = block.get_attribute("tier") else {
        return;
    };
    if tier.equals("Free", Case::Ignore) {
        results.add(
            Issue::new(block)
                .description(format!(
                    "Resource '{}' sets security center subscription type to free.",
                    block.full_name()
                ))
                .attribute(tier),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::check_source;
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> Vec<crate::rules::Finding> {
        check_source(&enable_standard_subscription(), src)
    }

    #[test]
    fn flags_free_tier() {
        let findings = run(
            r#"
resource "azurerm_security_center_subscription_pricing" "bad_example" {
  tier          = "Free"
  resource_type = "VirtualMachines"
}
"#,
        );
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.rule_id, "enable-standard-subscription");
        assert_eq!(f.long_id, "azure-security-center-enable-standard-subscription");
        assert_eq!(f.severity, Severity::Low);
        assert_eq!(
            f.description,
            "Resource 'azurerm_security_center_subscription_pricing.bad_example' sets security center subscription type to free."
        );
        assert_eq!(f.range.start_line, 3);
        let annotation = f.annotation.as_ref().unwrap();
        assert_eq!(annotation.name, "tier");
        assert_eq!(annotation.value.as_deref(), Some("Free"));
    }

    #[test]
    fn tier_comparison_ignores_case() {
        let findings = run(
            r#"
resource "azurerm_security_center_subscription_pricing" "x" {
  tier = "fREE"
}
"#,
        );
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn standard_tier_passes() {
        assert!(run(
            r#"
resource "azurerm_security_center_subscription_pricing" "good_example" {
  tier          = "Standard"
  resource_type = "VirtualMachines"
}
"#
        )
        .is_empty());
    }

    #[test]
    fn missing_tier_passes() {
        assert!(run(
            r#"
resource "azurerm_security_center_subscription_pricing" "x" {
  resource_type = "VirtualMachines"
}
"#
        )
        .is_empty());
    }

    #[test]
    fn tier_from_variable_default() {
        let findings = run(
            r#"
variable "tier" {
  default = "Free"
}

resource "azurerm_security_center_subscription_pricing" "x" {
  tier = var.tier
}
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].range.start_line, 7);
    }

    #[test]
    fn unresolvable_tier_is_not_reported() {
        assert!(run(
            r#"
variable "tier" {}

resource "azurerm_security_center_subscription_pricing" "x" {
  tier = var.tier
}
"#
        )
        .is_empty());
    }

    #[test]
    fn other_resource_types_are_ignored() {
        assert!(run(
            r#"
resource "azurerm_storage_account" "x" {
  tier = "Free"
}
"#
        )
        .is_empty());
    }
}
