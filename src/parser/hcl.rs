use std::path::Path;

use hcl_edit::expr::{Expression, ObjectKey, TraversalOperator};
use hcl_edit::structure::{Attribute, Block, BlockLabel, Body, Structure};
use hcl_edit::template::Element;
use hcl_edit::Span;

use super::LineIndex;
use crate::syntax::{Expr, Reference, Step, SyntaxAttribute, SyntaxBlock, SyntaxBody, TemplatePart};

pub(super) struct Converter<'a> {
    path: &'a Path,
    index: &'a LineIndex<'a>,
}

impl<'a> Converter<'a> {
    pub(super) fn new(path: &'a Path, index: &'a LineIndex<'a>) -> Self {
        Self { path, index }
    }

    pub(super) fn body(&self, body: &Body) -> SyntaxBody {
        let mut out = SyntaxBody::default();
        for structure in body.iter() {
            match structure {
                Structure::Attribute(attr) => out.attributes.push(self.attribute(attr)),
                Structure::Block(block) => out.blocks.push(self.block(block)),
            }
        }
        out
    }

    fn block(&self, block: &Block) -> SyntaxBlock {
        let labels = block
            .labels
            .iter()
            .map(|label| match label {
                BlockLabel::String(s) => s.value().clone(),
                BlockLabel::Ident(ident) => ident.value().as_str().to_string(),
            })
            .collect();

        SyntaxBlock {
            ident: block.ident.value().as_str().to_string(),
            labels,
            body: self.body(&block.body),
            range: self.index.range(self.path, block.span()),
        }
    }

    fn attribute(&self, attr: &Attribute) -> SyntaxAttribute {
        SyntaxAttribute {
            key: attr.key.value().as_str().to_string(),
            expr: expression(&attr.value),
            range: self.index.range(self.path, attr.span()),
        }
    }
}

fn raw(expr: &Expression) -> Expr {
    Expr::Unsupported(expr.to_string().trim().to_string())
}

fn template<'e>(elements: impl Iterator<Item = &'e Element>, whole: &Expression) -> Expr {
    let mut parts = Vec::new();
    for element in elements {
        match element {
            Element::Literal(literal) => parts.push(TemplatePart::Literal(literal.value().clone())),
            Element::Interpolation(interpolation) => {
                parts.push(TemplatePart::Interpolation(expression(&interpolation.expr)))
            }
            Element::Directive(_) => return raw(whole),
        }
    }
    Expr::Template(parts)
}

pub(super) fn expression(expr: &Expression) -> Expr {
    match expr {
        Expression::Null(_) => Expr::Null,
        Expression::Bool(b) => Expr::Bool(*b.value()),
        Expression::Number(n) => match n.value().as_f64() {
            Some(value) => Expr::Number(value),
            None => raw(expr),
        },
        Expression::String(s) => Expr::String(s.value().clone()),
        Expression::Array(items) => Expr::Array(items.iter().map(expression).collect()),
        Expression::Object(object) => {
            let mut entries = Vec::new();
            for (key, value) in object.iter() {
                let key = match key {
                    ObjectKey::Ident(ident) => ident.value().as_str().to_string(),
                    ObjectKey::Expression(Expression::String(s)) => s.value().clone(),
                    ObjectKey::Expression(_) => return raw(expr),
                };
                entries.push((key, expression(value.expr())));
            }
            Expr::Object(entries)
        }
        Expression::StringTemplate(t) => template(t.iter(), expr),
        Expression::HeredocTemplate(heredoc) => template(heredoc.template.iter(), expr),
        Expression::Parenthesis(inner) => expression(inner.inner()),
        Expression::Variable(var) => Expr::Reference(Reference::new(var.value().as_str(), vec![])),
        Expression::Traversal(traversal) => {
            let Expression::Variable(root) = &traversal.expr else {
                return raw(expr);
            };
            let steps = traversal
                .operators
                .iter()
                .map(|op| match op.value() {
                    TraversalOperator::GetAttr(ident) => Step::Attr(ident.value().as_str().to_string()),
                    TraversalOperator::LegacyIndex(i) => Step::Index(*i.value()),
                    TraversalOperator::Index(Expression::Number(n)) => {
                        n.value().as_u64().map(Step::Index).unwrap_or(Step::Splat)
                    }
                    TraversalOperator::Index(Expression::String(s)) => Step::Key(s.value().clone()),
                    _ => Step::Splat,
                })
                .collect();
            Expr::Reference(Reference::new(root.value().as_str(), steps))
        }
        Expression::FuncCall(call) => {
            let mut name = call
                .name
                .namespace
                .iter()
                .map(|ns| ns.value().as_str().to_string())
                .collect::<Vec<_>>()
                .join("::");
            if !name.is_empty() {
                name.push_str("::");
            }
            name.push_str(call.name.name.value().as_str());
            Expr::FuncCall {
                name,
                args: call.args.iter().map(expression).collect(),
            }
        }
        Expression::Conditional(cond) => Expr::Conditional {
            cond: Box::new(expression(&cond.cond_expr)),
            true_expr: Box::new(expression(&cond.true_expr)),
            false_expr: Box::new(expression(&cond.false_expr)),
        },
        _ => raw(expr),
    }
}
