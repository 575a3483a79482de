//! Rule execution.
//!
//! A scan unit is one file of one module instance. Units share the
//! read-only `ModuleGraph` and `RuleRegistry` and run on the rayon pool
//! unless the scan is sequential; each gets a private `ResolutionContext`.
//! Within a unit, blocks are visited depth-first and every matching rule
//! runs on a fresh `ResultSet`.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use rayon::prelude::*;

use crate::context::{ModuleGraph, ResolutionContext, ScopeId};
use crate::model::{build_file_until, Block, ModelError};
use crate::rules::{Finding, Provider, ResultSet, Rule, RuleError, RuleRegistry};
use crate::syntax::SyntaxFile;

/// A cancellation handle shared between the caller and scan workers.
///
/// Workers check it between top-level blocks.
#[derive(Debug, Clone, Default)]
pub struct ScanCancellation {
    flag: Arc<AtomicBool>,
}

impl ScanCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Stop conditions for a scan: an explicit signal and an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    cancellation: ScanCancellation,
    deadline: Option<Instant>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancellation: ScanCancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation(&self) -> &ScanCancellation {
        &self.cancellation
    }

    pub fn should_stop(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Everything a scan produced, before the policy overlay.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Raw findings, in visit order.
    pub findings: Vec<Finding>,
    pub rule_errors: Vec<RuleError>,
    pub model_errors: Vec<ModelError>,
    /// Set when the scan stopped early; the other fields hold partial results.
    pub cancelled: bool,
    pub blocks_scanned: usize,
}

impl ScanOutcome {
    fn merge(&mut self, other: ScanOutcome) {
        self.findings.extend(other.findings);
        self.rule_errors.extend(other.rule_errors);
        self.model_errors.extend(other.model_errors);
        self.cancelled |= other.cancelled;
        self.blocks_scanned += other.blocks_scanned;
    }
}

pub struct Scanner<'r> {
    registry: &'r RuleRegistry,
    control: ScanControl,
    parallel: bool,
}

impl<'r> Scanner<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            control: ScanControl::default(),
            parallel: true,
        }
    }

    pub fn with_control(mut self, control: ScanControl) -> Self {
        self.control = control;
        self
    }

    /// Run scan units one after another on the calling thread.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Scan every file of every module in `graph`.
    pub fn scan_graph(&self, graph: &ModuleGraph) -> ScanOutcome {
        let units: Vec<(ScopeId, &SyntaxFile)> = graph.units().collect();
        tracing::debug!(
            units = units.len(),
            rules = self.registry.len(),
            parallel = self.parallel,
            "starting scan"
        );

        let outcomes: Vec<ScanOutcome> = if self.parallel {
            units
                .par_iter()
                .map(|(scope, file)| self.scan_unit(graph, *scope, file))
                .collect()
        } else {
            units
                .iter()
                .map(|(scope, file)| self.scan_unit(graph, *scope, file))
                .collect()
        };

        let mut total = ScanOutcome::default();
        for outcome in outcomes {
            total.merge(outcome);
        }
        if total.cancelled {
            tracing::warn!(
                blocks = total.blocks_scanned,
                "scan stopped early, results are partial"
            );
        }
        total
    }

    fn scan_unit(&self, graph: &ModuleGraph, scope: ScopeId, file: &SyntaxFile) -> ScanOutcome {
        if self.control.should_stop() {
            return ScanOutcome {
                cancelled: true,
                ..Default::default()
            };
        }
        let ctx = ResolutionContext::new(graph);
        let built = build_file_until(file, scope, &ctx, || self.control.should_stop());
        let mut outcome = self.scan(&built.blocks, &ctx);
        outcome.cancelled |= built.interrupted;
        outcome.model_errors.extend(built.errors);
        outcome
    }

    /// Run every applicable rule over `blocks` and their descendants.
    pub fn scan(&self, blocks: &[Block], ctx: &ResolutionContext<'_>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        for block in blocks {
            if self.control.should_stop() {
                outcome.cancelled = true;
                break;
            }
            let provider = block.type_label().and_then(Provider::from_type_label);
            self.visit(block, provider, ctx, &mut outcome);
        }
        outcome
    }

    fn visit(
        &self,
        block: &Block,
        provider: Option<Provider>,
        ctx: &ResolutionContext<'_>,
        outcome: &mut ScanOutcome,
    ) {
        outcome.blocks_scanned += 1;
        for rule in self.registry.all_rules() {
            if rule.applies_to(block, provider) {
                run_rule(rule, block, ctx, outcome);
            }
        }
        for child in block.children() {
            self.visit(child, provider, ctx, outcome);
        }
    }
}

thread_local! {
    static IN_RULE_CHECK: Cell<bool> = const { Cell::new(false) };
}

/// Panics inside a rule check are reported through `tracing` as rule
/// errors; every other panic still reaches the previous hook.
static QUIET_RULE_PANICS: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if !IN_RULE_CHECK.with(Cell::get) {
            previous(info);
        }
    }));
});

fn run_rule(rule: &Rule, block: &Block, ctx: &ResolutionContext<'_>, outcome: &mut ScanOutcome) {
    Lazy::force(&QUIET_RULE_PANICS);
    IN_RULE_CHECK.with(|flag| flag.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut results = ResultSet::new(rule);
        (rule.check)(&mut results, block, ctx);
        results.into_findings()
    }));
    IN_RULE_CHECK.with(|flag| flag.set(false));

    match result {
        Ok(findings) => outcome.findings.extend(findings),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(
                rule = rule.short_code,
                block = %block.full_name(),
                range = %block.range(),
                error = %message,
                "rule check failed"
            );
            outcome.rule_errors.push(RuleError {
                rule_id: rule.short_code.to_string(),
                block: block.full_name().to_string(),
                range: block.range().clone(),
                message,
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "rule panicked".to_string()
    }
}
