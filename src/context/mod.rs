//! Reference resolution.
//!
//! `ModuleGraph` is built once per scan from every loaded module and is
//! shared read-only between workers. Each scan unit gets its own
//! `ResolutionContext` on top of it, holding the memo cache and the set of
//! symbols currently being resolved.

mod eval;
mod functions;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Resolution, Unknown, Value};
use crate::syntax::{Expr, Reference, Step, SyntaxFile};

/// Index of a module instance in the `ModuleGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

/// Parsed files of one module directory, as produced by the loader.
///
/// The first source is the root module. Every other source names the
/// index of the module that calls it and the call's block label; parents
/// must come before their children.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    pub dir: PathBuf,
    pub parent: Option<usize>,
    pub call_name: Option<String>,
    pub files: Vec<SyntaxFile>,
    /// `.tfvars` documents supplying values for this module's variables.
    pub variable_files: Vec<SyntaxFile>,
}

impl ModuleSource {
    pub fn root(dir: impl Into<PathBuf>, files: Vec<SyntaxFile>) -> Self {
        Self {
            dir: dir.into(),
            parent: None,
            call_name: None,
            files,
            variable_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleCall {
    pub source: Option<String>,
    /// Arguments of the `module` block, evaluated in the calling scope.
    pub arguments: HashMap<String, Expr>,
    /// Scope of the called module when its source was loaded.
    pub target: Option<ScopeId>,
}

/// One module instance.
#[derive(Debug, Clone)]
pub struct ModuleScope {
    id: ScopeId,
    parent: Option<ScopeId>,
    call_name: Option<String>,
    address: String,
    dir: PathBuf,
    files: Vec<SyntaxFile>,
    /// Declared variables and their `default` expressions.
    variables: HashMap<String, Option<Expr>>,
    /// Values from `.tfvars` files.
    inputs: HashMap<String, Expr>,
    locals: HashMap<String, Expr>,
    outputs: HashMap<String, Expr>,
    calls: HashMap<String, ModuleCall>,
}

impl ModuleScope {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// `module.a.module.b`, empty for the root module.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[SyntaxFile] {
        &self.files
    }

    pub fn declares_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn declares_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    pub fn call(&self, name: &str) -> Option<&ModuleCall> {
        self.calls.get(name)
    }
}

/// Every module instance of one scan.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    scopes: Vec<ModuleScope>,
}

impl ModuleGraph {
    pub fn build(sources: Vec<ModuleSource>) -> Self {
        let mut scopes: Vec<ModuleScope> = Vec::with_capacity(sources.len());

        for (index, source) in sources.into_iter().enumerate() {
            let id = ScopeId(index);
            let parent = source.parent.filter(|p| *p < index).map(ScopeId);
            if source.parent.is_some() && parent.is_none() {
                tracing::warn!(
                    dir = %source.dir.display(),
                    "module listed before its caller, treating it as a root"
                );
            }

            let address = match (parent, &source.call_name) {
                (Some(p), Some(name)) => {
                    let parent_address = &scopes[p.0].address;
                    if parent_address.is_empty() {
                        format!("module.{name}")
                    } else {
                        format!("{parent_address}.module.{name}")
                    }
                }
                _ => String::new(),
            };

            let mut scope = ModuleScope {
                id,
                parent,
                call_name: source.call_name.clone(),
                address,
                dir: source.dir,
                files: Vec::new(),
                variables: HashMap::new(),
                inputs: HashMap::new(),
                locals: HashMap::new(),
                outputs: HashMap::new(),
                calls: HashMap::new(),
            };
            collect_declarations(&mut scope, &source.files);
            for vars in &source.variable_files {
                for attr in &vars.body.attributes {
                    scope.inputs.insert(attr.key.clone(), attr.expr.clone());
                }
            }
            scope.files = source.files;

            if let (Some(p), Some(name)) = (parent, &source.call_name) {
                scopes[p.0].calls.entry(name.clone()).or_default().target = Some(id);
            }
            scopes.push(scope);
        }

        Self { scopes }
    }

    /// Graph of a single root module with no variable files.
    pub fn single(dir: impl Into<PathBuf>, files: Vec<SyntaxFile>) -> Self {
        Self::build(vec![ModuleSource::root(dir, files)])
    }

    pub fn scope(&self, id: ScopeId) -> &ModuleScope {
        &self.scopes[id.0]
    }

    pub fn scopes(&self) -> &[ModuleScope] {
        &self.scopes
    }

    pub fn root(&self) -> Option<&ModuleScope> {
        self.scopes.first()
    }

    /// Every (scope, file) pair: the independent scan units.
    pub fn units(&self) -> impl Iterator<Item = (ScopeId, &SyntaxFile)> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.files.iter().map(move |file| (scope.id, file)))
    }

    /// Innermost scope, starting at `from` and walking outward, that
    /// declares `name` according to `declares`.
    fn lookup(&self, from: ScopeId, declares: impl Fn(&ModuleScope) -> bool) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.scope(id);
            if declares(scope) {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }
}

fn collect_declarations(scope: &mut ModuleScope, files: &[SyntaxFile]) {
    for file in files {
        for block in &file.body.blocks {
            match (block.ident.as_str(), block.labels.as_slice()) {
                ("variable", [name]) => {
                    let default = block.body.get_attribute("default").map(|a| a.expr.clone());
                    scope.variables.insert(name.clone(), default);
                }
                ("locals", []) => {
                    for attr in &block.body.attributes {
                        scope.locals.insert(attr.key.clone(), attr.expr.clone());
                    }
                }
                ("output", [name]) => {
                    if let Some(value) = block.body.get_attribute("value") {
                        scope.outputs.insert(name.clone(), value.expr.clone());
                    }
                }
                ("module", [name]) => {
                    let call = scope.calls.entry(name.clone()).or_default();
                    for attr in &block.body.attributes {
                        if attr.key == "source" {
                            call.source = attr.expr.as_str().map(str::to_string);
                        } else {
                            call.arguments.insert(attr.key.clone(), attr.expr.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Symbol {
    Variable(ScopeId, String),
    Local(ScopeId, String),
    Output(ScopeId, String),
}

impl Symbol {
    fn describe(&self) -> String {
        match self {
            Self::Variable(_, name) => format!("var.{name}"),
            Self::Local(_, name) => format!("local.{name}"),
            Self::Output(_, name) => format!("output.{name}"),
        }
    }
}

/// Clears the in-progress mark on drop, including when a caller unwinds
/// out of a resolution.
struct InProgress<'a> {
    set: &'a RefCell<HashSet<Symbol>>,
    symbol: Symbol,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.symbol);
    }
}

/// Per scan unit resolver over a shared `ModuleGraph`.
///
/// Lookups are lazy and memoized, so resolving the same reference twice
/// returns the same value. A symbol that is reached again while it is still
/// being resolved resolves to `Unknown::Cycle`.
#[derive(Debug)]
pub struct ResolutionContext<'g> {
    graph: &'g ModuleGraph,
    cache: RefCell<HashMap<Symbol, Resolution>>,
    in_progress: RefCell<HashSet<Symbol>>,
}

impl<'g> ResolutionContext<'g> {
    pub fn new(graph: &'g ModuleGraph) -> Self {
        Self {
            graph,
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    pub fn graph(&self) -> &'g ModuleGraph {
        self.graph
    }

    /// Resolve a reference as seen from `scope`.
    pub fn resolve(&self, reference: &Reference, scope: ScopeId) -> Resolution {
        let describe = || reference.to_string();
        let (resolved, rest) = match (reference.root.as_str(), reference.steps.as_slice()) {
            ("var", [Step::Attr(name), rest @ ..]) => {
                match self.graph.lookup(scope, |s| s.declares_variable(name)) {
                    Some(owner) => (self.symbol(Symbol::Variable(owner, name.clone())), rest),
                    None => return unresolvable(describe()),
                }
            }
            ("local", [Step::Attr(name), rest @ ..]) => {
                match self.graph.lookup(scope, |s| s.declares_local(name)) {
                    Some(owner) => (self.symbol(Symbol::Local(owner, name.clone())), rest),
                    None => return unresolvable(describe()),
                }
            }
            ("module", [Step::Attr(call), Step::Attr(output), rest @ ..]) => {
                let Some(module_call) = self.graph.scope(scope).call(call) else {
                    return unresolvable(describe());
                };
                match module_call.target {
                    Some(target) => (self.symbol(Symbol::Output(target, output.clone())), rest),
                    None => return external(describe()),
                }
            }
            ("path", [Step::Attr(kind)]) => {
                let dir = match kind.as_str() {
                    "module" => self.graph.scope(scope).dir(),
                    "root" | "cwd" => self
                        .graph
                        .root()
                        .map(ModuleScope::dir)
                        .unwrap_or_else(|| self.graph.scope(scope).dir()),
                    _ => return unresolvable(describe()),
                };
                return Resolution::Known(Value::String(dir.display().to_string()));
            }
            _ => return external(describe()),
        };

        match resolved {
            Resolution::Known(value) => index_value(value, rest, reference),
            unknown => unknown,
        }
    }

    /// Evaluate an expression in `scope`.
    pub fn evaluate(&self, expr: &Expr, scope: ScopeId) -> Resolution {
        eval::evaluate(self, expr, scope)
    }

    fn symbol(&self, symbol: Symbol) -> Resolution {
        if let Some(cached) = self.cache.borrow().get(&symbol) {
            return cached.clone();
        }
        let Some(guard) = self.enter(&symbol) else {
            tracing::debug!(symbol = %symbol.describe(), "reference cycle");
            return Resolution::Unknown(Unknown::Cycle {
                reference: symbol.describe(),
            });
        };

        let resolved = self.compute(&symbol);

        drop(guard);
        self.cache.borrow_mut().insert(symbol, resolved.clone());
        resolved
    }

    /// Mark `symbol` as being resolved. `None` if it already is.
    fn enter(&self, symbol: &Symbol) -> Option<InProgress<'_>> {
        if !self.in_progress.borrow_mut().insert(symbol.clone()) {
            return None;
        }
        Some(InProgress {
            set: &self.in_progress,
            symbol: symbol.clone(),
        })
    }

    fn compute(&self, symbol: &Symbol) -> Resolution {
        match symbol {
            Symbol::Variable(id, name) => self.variable_value(*id, name),
            Symbol::Local(id, name) => match self.graph.scope(*id).locals.get(name) {
                Some(expr) => self.evaluate(expr, *id),
                None => unresolvable(symbol.describe()),
            },
            Symbol::Output(id, name) => match self.graph.scope(*id).outputs.get(name) {
                Some(expr) => self.evaluate(expr, *id),
                None => unresolvable(symbol.describe()),
            },
        }
    }

    /// Caller argument, then `.tfvars`, then `default`.
    fn variable_value(&self, id: ScopeId, name: &str) -> Resolution {
        let scope = self.graph.scope(id);

        if let (Some(parent), Some(call_name)) = (scope.parent, scope.call_name.as_deref()) {
            let argument = self
                .graph
                .scope(parent)
                .call(call_name)
                .and_then(|call| call.arguments.get(name));
            if let Some(expr) = argument {
                return self.evaluate(expr, parent);
            }
        }
        if let Some(expr) = scope.inputs.get(name) {
            return self.evaluate(expr, id);
        }
        match scope.variables.get(name) {
            Some(Some(default)) => self.evaluate(default, id),
            _ => external(format!("var.{name}")),
        }
    }
}

fn unresolvable(reference: String) -> Resolution {
    Resolution::Unknown(Unknown::Unresolvable { reference })
}

fn external(reference: String) -> Resolution {
    Resolution::Unknown(Unknown::External { reference })
}

/// Apply the remaining traversal steps to a resolved value.
fn index_value(mut value: Value, steps: &[Step], reference: &Reference) -> Resolution {
    for step in steps {
        let next = match (step, value) {
            (Step::Attr(key) | Step::Key(key), Value::Map(mut map)) => map.remove(key),
            (Step::Index(i), Value::List(mut items)) => {
                let i = *i as usize;
                if i < items.len() {
                    Some(items.swap_remove(i))
                } else {
                    None
                }
            }
            (Step::Splat, _) => {
                return Resolution::Unknown(Unknown::Unsupported {
                    expression: reference.to_string(),
                })
            }
            _ => None,
        };
        match next {
            Some(v) => value = v,
            None => return unresolvable(reference.to_string()),
        }
    }
    Resolution::Known(value)
}
