//! Parser-facing syntax tree.
//!
//! The parser hands the engine one `SyntaxFile` per source file. Nothing in
//! here is evaluated: references to variables, locals, module outputs and
//! other resources stay as `Reference` values until the resolution context
//! looks at them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A span in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub file: PathBuf,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceRange {
    pub fn new(
        file: impl Into<PathBuf>,
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        Self {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Range covering the first character of `file`, used when the parser
    /// could not attach a span to a node.
    pub fn file_start(file: &Path) -> Self {
        Self::new(file, 1, 1, 1, 1)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}", self.file.display(), self.start_line)
        } else {
            write!(
                f,
                "{}:{}-{}",
                self.file.display(),
                self.start_line,
                self.end_line
            )
        }
    }
}

/// One parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxFile {
    pub path: PathBuf,
    pub body: SyntaxBody,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntaxBody {
    pub attributes: Vec<SyntaxAttribute>,
    pub blocks: Vec<SyntaxBlock>,
}

impl SyntaxBody {
    pub fn get_attribute(&self, key: &str) -> Option<&SyntaxAttribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    pub fn blocks_of<'a>(&'a self, ident: &'a str) -> impl Iterator<Item = &'a SyntaxBlock> + 'a {
        self.blocks.iter().filter(move |b| b.ident == ident)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxBlock {
    /// Block keyword (`resource`, `ingress`, `dynamic`, ...).
    pub ident: String,
    pub labels: Vec<String>,
    pub body: SyntaxBody,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxAttribute {
    pub key: String,
    pub expr: Expr,
    pub range: SourceRange,
}

/// Unevaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Reference(Reference),
    FuncCall {
        name: String,
        args: Vec<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    /// Operators, `for` expressions, template directives. Kept as source text.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
}

impl Expr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Template(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => write!(f, "{}", s.escape_default())?,
                        TemplatePart::Interpolation(e) => write!(f, "${{{e}}}")?,
                    }
                }
                write!(f, "\"")
            }
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {k} = {v}")?;
                }
                write!(f, " }}")
            }
            Self::Reference(r) => write!(f, "{r}"),
            Self::FuncCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Conditional {
                cond,
                true_expr,
                false_expr,
            } => write!(f, "{cond} ? {true_expr} : {false_expr}"),
            Self::Unsupported(raw) => write!(f, "{raw}"),
        }
    }
}

/// A traversal rooted at a bare identifier, e.g. `var.region` or
/// `module.network.subnet_ids[0]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub root: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Attr(String),
    Index(u64),
    Key(String),
    /// Splats and computed indexes.
    Splat,
}

impl Reference {
    pub fn new(root: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            root: root.into(),
            steps,
        }
    }

    /// Build a reference from a dotted path made of plain attribute steps.
    pub fn from_path(path: &str) -> Self {
        let mut parts = path.split('.');
        let root = parts.next().unwrap_or_default().to_string();
        let steps = parts.map(|p| Step::Attr(p.to_string())).collect();
        Self { root, steps }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                Step::Attr(name) => write!(f, ".{name}")?,
                Step::Index(i) => write!(f, "[{i}]")?,
                Step::Key(k) => write!(f, "[{k:?}]")?,
                Step::Splat => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}
