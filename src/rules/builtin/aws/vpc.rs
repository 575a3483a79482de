use crate::context::ResolutionContext;
use crate::model::{Attribute, Block, BlockType, Case};
use crate::rules::{Issue, Provider, ResultSet, Rule, RuleDocumentation, Severity};

const OPEN_CIDRS: [&str; 2] = ["0.0.0.0/0", "::/0"];
const CIDR_ATTRIBUTES: [&str; 2] = ["cidr_blocks", "ipv6_cidr_blocks"];

pub(super) fn no_public_ingress_sgr() -> Rule {
    Rule {
        provider: Provider::Aws,
        service: "vpc",
        short_code: "no-public-ingress-sgr",
        required_types: &[BlockType::Resource, BlockType::Nested],
        required_labels: &["aws_security_group_rule", "ingress"],
        default_severity: Severity::Critical,
        documentation: RuleDocumentation {
            summary: "Security group rules should not allow ingress from the public internet",
            explanation: "Opening ingress to 0.0.0.0/0 or ::/0 exposes the protected \
                resources to every address on the internet.",
            impact: "Your port is exposed to the internet",
            resolution: "Set a more restrictive CIDR range",
            bad_examples: &[r#"
resource "aws_security_group_rule" "bad_example" {
  type        = "ingress"
  cidr_blocks = ["0.0.0.0/0"]
}
"#],
            good_examples: &[r#"
resource "aws_security_group_rule" "good_example" {
  type        = "ingress"
  cidr_blocks = ["10.0.0.0/16"]
}
"#],
            links: &[
                "https://registry.terraform.io/providers/hashicorp/aws/latest/docs/resources/security_group_rule#cidr_blocks",
                "https://docs.aws.amazon.com/vpc/latest/userguide/VPC_SecurityGroups.html",
            ],
        },
        check,
    }
}

fn check(results: &mut ResultSet<'_>, block: &Block, _ctx: &ResolutionContext<'_>) {
    match block.block_type() {
        BlockType::Nested => {
            if block.parent_type() != Some("aws_security_group") {
                return;
            }
        }
        _ => {
            let is_ingress = block
                .get_attribute("type")
                .map_or(false, |t| t.equals("ingress", Case::Sensitive));
            if !is_ingress {
                return;
            }
        }
    }

    for name in CIDR_ATTRIBUTES {
        if let Some(attr) = block.get_attribute(name) {
            if let Some(cidr) = open_cidr(attr) {
                results.add(
                    Issue::new(block)
                        .description(format!(
                            "Resource '{}' defines a fully open ingress security group rule ({cidr}).",
                            block.full_name()
                        ))
                        .attribute(attr),
                );
            }
        }
    }
}

fn open_cidr(attr: &Attribute) -> Option<&'static str> {
    OPEN_CIDRS
        .iter()
        .copied()
        .find(|cidr| attr.contains(*cidr, Case::Sensitive) && attr.as_list().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::check_source;

    fn run(src: &str) -> Vec<crate::rules::Finding> {
        check_source(&no_public_ingress_sgr(), src)
    }

    #[test]
    fn flags_open_security_group_rule() {
        let findings = run(
            r#"
resource "aws_security_group_rule" "r" {
  type             = "ingress"
  cidr_blocks      = ["10.0.0.0/8", "0.0.0.0/0"]
  ipv6_cidr_blocks = ["::/0"]
}
"#,
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn egress_rules_are_ignored() {
        assert!(run(
            r#"
resource "aws_security_group_rule" "r" {
  type        = "egress"
  cidr_blocks = ["0.0.0.0/0"]
}
"#
        )
        .is_empty());
    }

    #[test]
    fn flags_nested_and_dynamic_ingress() {
        let findings = run(
            r#"
variable "ports" {
  default = [22, 443]
}

resource "aws_security_group" "sg" {
  ingress {
    cidr_blocks = ["10.0.0.0/16"]
  }

  ingress {
    cidr_blocks = ["0.0.0.0/0"]
  }

  dynamic "ingress" {
    for_each = var.ports
    content {
      ipv6_cidr_blocks = ["::/0"]
    }
  }

  egress {
    cidr_blocks = ["0.0.0.0/0"]
  }
}
"#,
        );
        assert_eq!(findings.len(), 2);
        let lines: Vec<_> = findings.iter().map(|f| f.range.start_line).collect();
        assert_eq!(lines, vec![12, 18]);
    }

    #[test]
    fn ingress_blocks_of_other_resources_are_ignored() {
        assert!(run(
            r#"
resource "aws_network_acl" "n" {
  ingress {
    cidr_blocks = ["0.0.0.0/0"]
  }
}
"#
        )
        .is_empty());
    }

    #[test]
    fn only_direct_children_of_a_security_group_count() {
        assert!(run(
            r#"
resource "aws_instance" "aws_security_group" {
  network {
    ingress {
      cidr_blocks = ["0.0.0.0/0"]
    }
  }
}
"#
        )
        .is_empty());
    }

    #[test]
    fn unknown_cidrs_are_not_reported() {
        assert!(run(
            r#"
resource "aws_security_group_rule" "r" {
  type        = "ingress"
  cidr_blocks = [aws_vpc.main.cidr_block]
}
"#
        )
        .is_empty());
    }
}
