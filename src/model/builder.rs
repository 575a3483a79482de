use std::collections::BTreeMap;

use super::{Attribute, Block, BlockType, ModelError};
use crate::context::{ResolutionContext, ScopeId};
use crate::syntax::{SyntaxBlock, SyntaxBody, SyntaxFile};

/// Model of one scan unit. Blocks that could not be modelled are reported
/// in `errors` and left out; the rest of the file is still usable.
#[derive(Debug, Default)]
pub struct BuiltFile {
    pub blocks: Vec<Block>,
    pub errors: Vec<ModelError>,
    /// Building stopped before the last top-level block.
    pub interrupted: bool,
}

/// Build the block forest for `file`, resolving every attribute in `scope`.
pub fn build_file(file: &SyntaxFile, scope: ScopeId, ctx: &ResolutionContext<'_>) -> BuiltFile {
    build_file_until(file, scope, ctx, || false)
}

/// Like [`build_file`], but checks `should_stop` before each top-level block.
pub fn build_file_until(
    file: &SyntaxFile,
    scope: ScopeId,
    ctx: &ResolutionContext<'_>,
    should_stop: impl Fn() -> bool,
) -> BuiltFile {
    let prefix = ctx.graph().scope(scope).address().to_string();
    let mut built = BuiltFile::default();

    for syntax in &file.body.blocks {
        if should_stop() {
            built.interrupted = true;
            break;
        }
        let Some(block_type) = BlockType::from_keyword(&syntax.ident) else {
            tracing::debug!(
                file = %file.path.display(),
                keyword = %syntax.ident,
                "skipping unsupported top-level block"
            );
            continue;
        };

        if let Some(expected) = block_type.expected_labels() {
            if syntax.labels.len() != expected {
                built.errors.push(ModelError {
                    file: file.path.clone(),
                    message: format!(
                        "{} block expects {} label(s), found {}",
                        syntax.ident,
                        expected,
                        syntax.labels.len()
                    ),
                    range: Some(syntax.range.clone()),
                });
                continue;
            }
        }

        let name = qualify(&prefix, &local_name(block_type, syntax));
        built
            .blocks
            .push(build_block(syntax, block_type, name, None, false, scope, ctx));
    }

    built
}

fn local_name(block_type: BlockType, syntax: &SyntaxBlock) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(syntax.labels.len() + 1);
    if block_type != BlockType::Resource {
        parts.push(&syntax.ident);
    }
    parts.extend(syntax.labels.iter().map(String::as_str));
    parts.join(".")
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn build_block(
    syntax: &SyntaxBlock,
    block_type: BlockType,
    full_name: String,
    parent_type: Option<String>,
    dynamic: bool,
    scope: ScopeId,
    ctx: &ResolutionContext<'_>,
) -> Block {
    let attributes = build_attributes(&syntax.body, scope, ctx);
    let own_type = syntax.labels.first().unwrap_or(&syntax.ident);
    let children = build_children(&syntax.body, &full_name, own_type, scope, ctx);

    Block {
        block_type,
        ident: syntax.ident.clone(),
        labels: syntax.labels.clone(),
        attributes,
        children,
        range: syntax.range.clone(),
        scope,
        full_name,
        parent_type,
        dynamic,
    }
}

fn build_attributes(
    body: &SyntaxBody,
    scope: ScopeId,
    ctx: &ResolutionContext<'_>,
) -> BTreeMap<String, Attribute> {
    let mut attributes = BTreeMap::new();
    for attr in &body.attributes {
        if attributes.contains_key(&attr.key) {
            tracing::debug!(attribute = %attr.key, range = %attr.range, "duplicate attribute ignored");
            continue;
        }
        let resolution = ctx.evaluate(&attr.expr, scope);
        attributes.insert(
            attr.key.clone(),
            Attribute::new(attr.key.clone(), attr.expr.clone(), resolution, attr.range.clone()),
        );
    }
    attributes
}

/// `dynamic "x" { content { .. } }` becomes a single child `x` built from
/// `content`; the iterator's values are unknown so its references stay so.
fn build_children(
    body: &SyntaxBody,
    parent_name: &str,
    parent_type: &str,
    scope: ScopeId,
    ctx: &ResolutionContext<'_>,
) -> Vec<Block> {
    let mut children = Vec::with_capacity(body.blocks.len());
    for child in &body.blocks {
        match (child.ident.as_str(), child.labels.as_slice()) {
            ("dynamic", [generated]) => {
                let Some(content) = child.body.blocks_of("content").next() else {
                    continue;
                };
                let expanded = SyntaxBlock {
                    ident: generated.clone(),
                    labels: Vec::new(),
                    body: content.body.clone(),
                    range: child.range.clone(),
                };
                let name = format!("{parent_name}.{generated}");
                children.push(build_block(
                    &expanded,
                    BlockType::Nested,
                    name,
                    Some(parent_type.to_string()),
                    true,
                    scope,
                    ctx,
                ));
            }
            _ => {
                let name = format!("{parent_name}.{}", child.ident);
                children.push(build_block(
                    child,
                    BlockType::Nested,
                    name,
                    Some(parent_type.to_string()),
                    false,
                    scope,
                    ctx,
                ));
            }
        }
    }
    children
}
