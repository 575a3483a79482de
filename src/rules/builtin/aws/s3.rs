use crate::context::ResolutionContext;
use crate::model::{Block, BlockType, Case};
use crate::rules::{Issue, Provider, ResultSet, Rule, RuleDocumentation, Severity};

const PUBLIC_ACLS: [&str; 2] = ["public-read", "public-read-write"];

pub(super) fn no_public_access_with_acl() -> Rule {
    Rule {
        provider: Provider::Aws,
        service: "s3",
        short_code: "no-public-access-with-acl",
        required_types: &[BlockType::Resource],
        required_labels: &["aws_s3_bucket", "aws_s3_bucket_acl"],
        default_severity: Severity::High,
        documentation: RuleDocumentation {
            summary: "S3 buckets should not be publicly readable through their ACL",
            explanation: "Canned ACLs public-read and public-read-write grant every \
                anonymous caller access to the bucket's objects.",
            impact: "The contents of the bucket can be accessed publicly",
            resolution: "Apply a more restrictive bucket ACL",
            bad_examples: &[r#"
resource "aws_s3_bucket" "bad_example" {
  bucket = "my-bucket"
  acl    = "public-read"
}
"#],
            good_examples: &[r#"
resource "aws_s3_bucket" "good_example" {
  bucket = "my-bucket"
  acl    = "private"
}
"#],
            links: &[
                "https://registry.terraform.io/providers/hashicorp/aws/latest/docs/resources/s3_bucket_acl",
                "https://docs.aws.amazon.com/AmazonS3/latest/userguide/acl-overview.html#canned-acl",
            ],
        },
        check,
    }
}

fn check(results: &mut ResultSet<'_>, block: &Block, _ctx: &ResolutionContext<'_>) {
    let Some(acl) = block.get_attribute("acl") else {
        return;
    };
    if let Some(public) = PUBLIC_ACLS.iter().find(|p| acl.equals(**p, Case::Ignore)) {
        results.add(
            Issue::new(block)
                .description(format!(
                    "Resource '{}' has an ACL which allows public access ({public}).",
                    block.full_name()
                ))
                .attribute(acl),
        );
    }
}
