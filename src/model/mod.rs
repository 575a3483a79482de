//! Semantic block/attribute model.
//!
//! Built once per scan unit from the parser's syntax tree. Attribute values
//! are resolved while the model is built and never change afterwards.

mod attribute;
mod builder;
pub mod value;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use attribute::{Attribute, Case};
pub use builder::{build_file, build_file_until, BuiltFile};
pub use value::{Resolution, Unknown, Value, ValueType};

use crate::context::ScopeId;
use crate::syntax::SourceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Resource,
    Data,
    Module,
    Provider,
    Variable,
    Locals,
    Output,
    Terraform,
    /// Inline child block (`ingress { }`, expanded `dynamic` content, ...).
    Nested,
}

impl BlockType {
    /// Top-level keyword → block type. `None` for keywords the engine skips.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "resource" => Some(Self::Resource),
            "data" => Some(Self::Data),
            "module" => Some(Self::Module),
            "provider" => Some(Self::Provider),
            "variable" => Some(Self::Variable),
            "locals" => Some(Self::Locals),
            "output" => Some(Self::Output),
            "terraform" => Some(Self::Terraform),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Data => "data",
            Self::Module => "module",
            Self::Provider => "provider",
            Self::Variable => "variable",
            Self::Locals => "locals",
            Self::Output => "output",
            Self::Terraform => "terraform",
            Self::Nested => "nested",
        }
    }

    /// Number of labels a well-formed top-level block carries.
    pub(crate) fn expected_labels(&self) -> Option<usize> {
        match self {
            Self::Resource | Self::Data => Some(2),
            Self::Module | Self::Provider | Self::Variable | Self::Output => Some(1),
            Self::Locals | Self::Terraform => Some(0),
            Self::Nested => None,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way view of an attribute. Rules match on this when "not set" and
/// "set to something we cannot see" need different answers.
#[derive(Debug, Clone, Copy)]
pub enum AttributeState<'a> {
    /// Not declared, or declared as `null`.
    Absent,
    Unknown(&'a Attribute, &'a Unknown),
    Known(&'a Attribute, &'a Value),
}

/// One declared statement: resource, data source, module call, ... or an
/// inline child block of one of those.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    block_type: BlockType,
    ident: String,
    labels: Vec<String>,
    attributes: BTreeMap<String, Attribute>,
    children: Vec<Block>,
    range: SourceRange,
    scope: ScopeId,
    full_name: String,
    parent_type: Option<String>,
    dynamic: bool,
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    /// Keyword as written in the source (`resource`, `ingress`, ...).
    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// First label: the resource or data source type.
    pub fn type_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Last label: the local name of a resource, module, variable, ...
    pub fn name_label(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    pub fn range(&self) -> &SourceRange {
        &self.range
    }

    /// Module instance this block belongs to.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Resource address style name, e.g. `module.net.aws_vpc.main`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// For nested blocks: the type label of the enclosing block
    /// (`aws_security_group` for its `ingress` blocks), or its keyword when
    /// the enclosing block is itself nested. `None` at the top level.
    pub fn parent_type(&self) -> Option<&str> {
        self.parent_type.as_deref()
    }

    /// True for blocks expanded from a `dynamic` block's `content`.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute(&self, name: &str) -> AttributeState<'_> {
        match self.attributes.get(name) {
            None => AttributeState::Absent,
            Some(attr) => match attr.resolution() {
                Resolution::Known(Value::Null) => AttributeState::Absent,
                Resolution::Known(value) => AttributeState::Known(attr, value),
                Resolution::Unknown(unknown) => AttributeState::Unknown(attr, unknown),
            },
        }
    }

    /// Attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn children(&self) -> &[Block] {
        &self.children
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// A file (or a block inside it) the model builder could not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelError {
    pub file: PathBuf,
    pub message: String,
    pub range: Option<SourceRange>,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}: {}", range, self.message),
            None => write!(f, "{}: {}", self.file.display(), self.message),
        }
    }
}
