use crate::context::ResolutionContext;
use crate::model::{AttributeState, Block, BlockType, Value};
use crate::rules::{Issue, Provider, ResultSet, Rule, RuleDocumentation, Severity};

pub(super) fn encrypt_instance_storage_data() -> Rule {
    Rule {
        provider: Provider::Aws,
        service: "rds",
        short_code: "encrypt-instance-storage-data",
        required_types: &[BlockType::Resource],
        required_labels: &["aws_db_instance"],
        default_severity: Severity::High,
        documentation: RuleDocumentation {
            summary: "RDS instance storage should be encrypted at rest",
            explanation: "Unencrypted instance storage, snapshots and backups can be read \
                by anyone who gains access to the underlying volumes.",
            impact: "Data can be read from the RDS instance if it is compromised",
            resolution: "Set storage_encrypted to true",
            bad_examples: &[r#"
resource "aws_db_instance" "bad_example" {
  engine = "postgres"
}
"#],
            good_examples: &[r#"
resource "aws_db_instance" "good_example" {
  engine            = "postgres"
  storage_encrypted = true
}
"#],
            links: &[
                "https://registry.terraform.io/providers/hashicorp/aws/latest/docs/resources/db_instance#storage_encrypted",
                "https://docs.aws.amazon.com/AmazonRDS/latest/UserGuide/Overview.Encryption.html",
            ],
        },
        check,
    }
}

fn check(results: &mut ResultSet<'_>, block: &Block, _ctx: &ResolutionContext<'_>) {
    match block.attribute("storage_encrypted") {
        AttributeState::Absent => results.add(Issue::new(block).description(format!(
            "Resource '{}' has no storage encryption defined.",
            block.full_name()
        ))),
        AttributeState::Known(attr, Value::Bool(false)) => results.add(
            Issue::new(block)
                .description(format!(
                    "Resource '{}' has storage encryption disabled.",
                    block.full_name()
                ))
                .attribute(attr),
        ),
        AttributeState::Known(..) | AttributeState::Unknown(..) => {}
    }
}
