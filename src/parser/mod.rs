//! HCL source → `syntax` tree.
//!
//! `hcl-edit` does the actual parsing; `hcl` converts its structures into the
//! engine's syntax tree and `LineIndex` maps byte spans to line/column ranges.

mod hcl;

use std::ops::Range;
use std::path::Path;

use crate::error::{Result, ScanError};
use crate::syntax::{SourceRange, SyntaxFile};

/// Parse one HCL document.
pub fn parse_str(path: &Path, content: &str) -> Result<SyntaxFile> {
    let body = hcl_edit::parser::parse_body(content).map_err(|e| ScanError::Parse {
        file: path.display().to_string(),
        message: e.to_string(),
    })?;
    let index = LineIndex::new(content);
    let converter = hcl::Converter::new(path, &index);
    Ok(SyntaxFile {
        path: path.to_path_buf(),
        body: converter.body(&body),
    })
}

/// Byte offset → 1-based line/column lookup.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Line and column (both 1-based, column counted in characters).
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = self
            .source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line + 1, column + 1)
    }

    pub fn range(&self, file: &Path, span: Option<Range<usize>>) -> SourceRange {
        match span {
            Some(span) => {
                let (start_line, start_column) = self.position(span.start);
                // End positions are inclusive of the last character.
                let (end_line, end_column) = self.position(span.end.max(span.start + 1) - 1);
                SourceRange::new(file, start_line, start_column, end_line, end_column)
            }
            None => SourceRange::file_start(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Expr, Step, TemplatePart};
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> SyntaxFile {
        parse_str(Path::new("main.tf"), src).unwrap()
    }

    #[test]
    fn line_index_positions() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(4), (2, 2));
    }

    #[test]
    fn parses_resource_block_with_labels_and_range() {
        let file = parse(
            r#"
resource "azurerm_security_center_subscription_pricing" "example" {
  tier          = "Free"
  resource_type = "VirtualMachines"
}
"#,
        );
        assert_eq!(file.body.blocks.len(), 1);
        let block = &file.body.blocks[0];
        assert_eq!(block.ident, "resource");
        assert_eq!(
            block.labels,
            vec!["azurerm_security_center_subscription_pricing", "example"]
        );
        assert_eq!(block.range.start_line, 2);
        assert_eq!(block.range.end_line, 5);

        let tier = block.body.get_attribute("tier").unwrap();
        assert_eq!(tier.expr, Expr::String("Free".into()));
        assert_eq!(tier.range.start_line, 3);
        assert_eq!(tier.range.start_column, 3);
    }

    #[test]
    fn parses_references_and_templates() {
        let file = parse(
            r#"
locals {
  name   = "app-${var.env}"
  first  = module.net.subnet_ids[0]
  region = var.region
}
"#,
        );
        let locals = &file.body.blocks[0];
        let name = locals.body.get_attribute("name").unwrap();
        match &name.expr {
            Expr::Template(parts) => {
                assert_eq!(parts[0], TemplatePart::Literal("app-".into()));
                assert!(matches!(parts[1], TemplatePart::Interpolation(Expr::Reference(_))));
            }
            other => panic!("expected template, got {other:?}"),
        }

        let first = locals.body.get_attribute("first").unwrap();
        let Expr::Reference(reference) = &first.expr else {
            panic!("expected reference, got {:?}", first.expr);
        };
        assert_eq!(reference.root, "module");
        assert_eq!(
            reference.steps,
            vec![
                Step::Attr("net".into()),
                Step::Attr("subnet_ids".into()),
                Step::Index(0)
            ]
        );

        let region = locals.body.get_attribute("region").unwrap();
        assert_eq!(region.expr.to_string(), "var.region");
    }

    #[test]
    fn parses_nested_blocks_and_collections() {
        let file = parse(
            r#"
resource "aws_security_group" "web" {
  tags = { Name = "web", Team = "core" }
  ingress {
    cidr_blocks = ["10.0.0.0/8", "0.0.0.0/0"]
    from_port   = 443
  }
}
"#,
        );
        let sg = &file.body.blocks[0];
        assert_eq!(sg.body.blocks.len(), 1);
        let ingress = &sg.body.blocks[0];
        assert_eq!(ingress.ident, "ingress");
        assert!(ingress.labels.is_empty());
        assert_eq!(
            ingress.body.get_attribute("from_port").unwrap().expr,
            Expr::Number(443.0)
        );
        match &sg.body.get_attribute("tags").unwrap().expr {
            Expr::Object(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn operators_are_kept_as_raw_text() {
        let file = parse("locals {\n  n = 1 + 2\n}\n");
        let n = file.body.blocks[0].body.get_attribute("n").unwrap();
        assert!(matches!(&n.expr, Expr::Unsupported(raw) if raw == "1 + 2"));
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let err = parse_str(Path::new("bad.tf"), "resource \"x\" {").unwrap_err();
        assert!(matches!(err, ScanError::Parse { .. }));
    }
}
