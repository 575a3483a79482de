//! tfguard: static security scanner for Terraform configurations.
//!
//! Parses HCL into a block/attribute model, resolves variables, locals and
//! module outputs, runs a catalog of security rules over every block and
//! applies user severity overrides and exclusions to the results.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use tfguard::{scan, ScanOptions};
//!
//! let options = ScanOptions::default();
//! let report = scan(Path::new("./infra"), &options).unwrap();
//! println!("Pass: {}, Findings: {}", report.verdict.pass, report.visible_findings().count());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod model;
pub mod output;
pub mod parser;
pub mod rules;
pub mod scanner;
pub mod syntax;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use config::Config;
use context::{ModuleGraph, ModuleSource};
use error::Result;
use loader::LoadOptions;
use model::ModelError;
use output::OutputFormat;
use rules::policy::{Policy, PolicyVerdict};
use rules::{Finding, RuleError, RuleRegistry};
use scanner::{ScanCancellation, ScanControl, Scanner};

/// Options for a scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Config file path (defaults to `.tfguard/config.*` in the scan dir).
    pub config_path: Option<PathBuf>,
    pub format: OutputFormat,
    /// CLI override for the fail_on threshold.
    pub fail_on_override: Option<rules::Severity>,
    pub var_files: Vec<PathBuf>,
    /// Glob patterns of files to skip.
    pub exclude_paths: Vec<String>,
    pub timeout: Option<Duration>,
    /// Scan files on the rayon pool.
    pub parallel: bool,
    pub cancellation: Option<ScanCancellation>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            format: OutputFormat::Console,
            fail_on_override: None,
            var_files: Vec::new(),
            exclude_paths: Vec::new(),
            timeout: None,
            parallel: true,
            cancellation: None,
        }
    }
}

impl ScanOptions {
    fn control(&self) -> ScanControl {
        let mut control = ScanControl::new();
        if let Some(cancellation) = &self.cancellation {
            control = control.with_cancellation(cancellation.clone());
        }
        if let Some(timeout) = self.timeout {
            control = control.with_timeout(timeout);
        }
        control
    }
}

/// Complete scan report.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target_name: String,
    /// Final ordered findings, suppressed ones included and tagged.
    pub findings: Vec<Finding>,
    pub rule_errors: Vec<RuleError>,
    pub model_errors: Vec<ModelError>,
    /// The scan hit its deadline or was cancelled; findings are partial.
    pub cancelled: bool,
    pub verdict: PolicyVerdict,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    /// True when every rule ran to completion.
    pub fn is_success(&self) -> bool {
        self.rule_errors.is_empty()
    }

    /// Findings not suppressed by configuration.
    pub fn visible_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.suppressed)
    }
}

/// Run a complete scan: load config, read files, resolve, check, apply policy.
pub fn scan(path: &Path, options: &ScanOptions) -> Result<ScanReport> {
    let registry = RuleRegistry::builtin()?;

    let config_dir = if path.is_file() {
        path.parent().unwrap_or_else(|| Path::new("."))
    } else {
        path
    };
    let config_path = options
        .config_path
        .clone()
        .or_else(|| Config::discover(config_dir));
    let config = match config_path {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    let mut load_options = LoadOptions {
        var_files: options.var_files.clone(),
        ..Default::default()
    };
    for pattern in &options.exclude_paths {
        load_options = load_options.exclude(pattern)?;
    }
    let workspace = loader::load_workspace(path, &load_options)?;

    let target_name = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".into());

    Ok(run(
        &registry,
        &config,
        options,
        ModuleGraph::build(workspace.modules),
        workspace.errors,
        target_name,
    ))
}

/// Scan in-memory sources as a single root module rooted at `dir`.
pub fn scan_sources(
    dir: &Path,
    sources: &[(&str, &str)],
    config: &Config,
    options: &ScanOptions,
) -> Result<ScanReport> {
    let registry = RuleRegistry::builtin()?;
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for (name, content) in sources {
        let file_path = dir.join(name);
        match parser::parse_str(&file_path, content) {
            Ok(file) => files.push(file),
            Err(e) => errors.push(ModelError {
                file: file_path,
                message: e.to_string(),
                range: None,
            }),
        }
    }
    let graph = ModuleGraph::build(vec![ModuleSource::root(dir, files)]);
    let target_name = dir.display().to_string();
    Ok(run(&registry, config, options, graph, errors, target_name))
}

fn run(
    registry: &RuleRegistry,
    config: &Config,
    options: &ScanOptions,
    graph: ModuleGraph,
    load_errors: Vec<ModelError>,
    target_name: String,
) -> ScanReport {
    for unknown in config.unknown_checks(registry) {
        match &unknown.suggestion {
            Some(suggestion) => tracing::warn!(
                code = %unknown.code,
                "configuration names an unknown rule, did you mean '{suggestion}'?"
            ),
            None => tracing::warn!(code = %unknown.code, "configuration names an unknown rule"),
        }
    }

    let mut policy = Policy::from_config(config).canonicalize(registry);
    if let Some(fail_on) = options.fail_on_override {
        policy.fail_on = fail_on;
    }

    let mut scanner = Scanner::new(registry).with_control(options.control());
    if !options.parallel {
        scanner = scanner.sequential();
    }
    let outcome = scanner.scan_graph(&graph);

    let findings = policy.finalize(outcome.findings);
    let verdict = policy.evaluate(&findings);
    let mut model_errors = load_errors;
    model_errors.extend(outcome.model_errors);

    ScanReport {
        target_name,
        findings,
        rule_errors: outcome.rule_errors,
        model_errors,
        cancelled: outcome.cancelled,
        verdict,
        scanned_at: Utc::now(),
    }
}

/// Render a scan report in the specified format.
pub fn render_report(
    report: &ScanReport,
    format: OutputFormat,
    include_suppressed: bool,
) -> Result<String> {
    output::render(report, format, include_suppressed)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::rules::Severity;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const FIXTURES: &str = "tests/fixtures/terraform";

    fn fixture(name: &str) -> PathBuf {
        Path::new(FIXTURES).join(name)
    }

    fn scan_fixture(name: &str) -> ScanReport {
        scan(&fixture(name), &ScanOptions::default()).unwrap()
    }

    fn codes(report: &ScanReport) -> Vec<&str> {
        report.visible_findings().map(|f| f.rule_id.as_str()).collect()
    }

    #[test]
    fn free_tier_detected() {
        let report = scan_fixture("free_tier");
        assert_eq!(codes(&report), vec!["enable-standard-subscription"]);
        let finding = &report.findings[0];
        assert_eq!(finding.severity, Severity::Low);
        assert_eq!(
            finding.description,
            "Resource 'azurerm_security_center_subscription_pricing.bad_example' sets security center subscription type to free."
        );
        assert_eq!(finding.range.start_line, 2);
        assert!(finding.range.file.ends_with("main.tf"));
        let annotation = finding.annotation.as_ref().unwrap();
        assert_eq!(annotation.raw, "\"Free\"");
        assert_eq!(annotation.value.as_deref(), Some("Free"));
        assert!(!report.verdict.pass);
        assert!(report.is_success());
    }

    #[test]
    fn standard_tier_is_clean() {
        let report = scan_fixture("standard_tier");
        assert!(report.findings.is_empty());
        assert!(report.verdict.pass);
    }

    #[test]
    fn missing_tier_is_clean() {
        let report = scan_fixture("no_tier");
        assert!(report.findings.is_empty());
    }

    #[test]
    fn severity_override_from_config() {
        let report = scan_fixture("override");
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert_eq!(report.verdict.highest_severity, Some(Severity::Critical));
    }

    #[test]
    fn exclusion_from_config_suppresses() {
        let report = scan_fixture("excluded");
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].suppressed);
        assert_eq!(report.visible_findings().count(), 0);
        assert!(report.verdict.pass);
    }

    #[test]
    fn module_variables_resolve_through_calls() {
        let report = scan_fixture("modules");
        let located: Vec<_> = report
            .visible_findings()
            .map(|f| (f.rule_id.as_str(), f.description.as_str()))
            .collect();
        assert_eq!(
            located,
            vec![
                (
                    "no-public-access-with-acl",
                    "Resource 'aws_s3_bucket.logs' has an ACL which allows public access (public-read)."
                ),
                (
                    "enable-standard-subscription",
                    "Resource 'module.pricing.azurerm_security_center_subscription_pricing.this' sets security center subscription type to free."
                ),
            ]
        );
    }

    #[test]
    fn tfvars_override_defaults() {
        let report = scan_fixture("tfvars");
        assert_eq!(codes(&report), vec!["enable-standard-subscription"]);
        let annotation = report.findings[0].annotation.as_ref().unwrap();
        assert_eq!(annotation.raw, "var.tier");
        assert_eq!(annotation.value.as_deref(), Some("Free"));
        let rendered = render_report(&report, OutputFormat::Json, false).unwrap();
        assert!(rendered.contains("\"value\": \"Free\""));
    }

    #[test]
    fn cyclic_locals_complete() {
        let report = scan_fixture("cycle");
        assert!(report.findings.is_empty());
        assert!(report.is_success());
        assert!(!report.cancelled);
    }

    #[test]
    fn mixed_providers() {
        let report = scan_fixture("mixed");
        assert_eq!(
            codes(&report),
            vec![
                "enforce-https",
                "no-public-ingress-sgr",
                "encrypt-instance-storage-data",
            ]
        );
    }

    #[test]
    fn explicit_config_and_fail_on_override() {
        let options = ScanOptions {
            config_path: Some(fixture("override/.tfguard/config.yml")),
            fail_on_override: Some(Severity::Critical),
            ..Default::default()
        };
        let report = scan(&fixture("free_tier"), &options).unwrap();
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert!(!report.verdict.pass);

        let options = ScanOptions {
            fail_on_override: Some(Severity::Medium),
            ..Default::default()
        };
        assert!(scan(&fixture("free_tier"), &options).unwrap().verdict.pass);
    }

    #[test]
    fn bad_severity_token_is_fatal() {
        let options = ScanOptions {
            config_path: Some(fixture("bad_config/config.json")),
            ..Default::default()
        };
        let err = scan(&fixture("free_tier"), &options).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(err.exit_code(), 2);
    }

    /// Scan the `mixed` fixture with its top-level blocks visited in `order`.
    fn mixed_in_order(order: &[usize]) -> Vec<Finding> {
        use crate::context::{ResolutionContext, ScopeId};

        let dir = fixture("mixed");
        let path = dir.join("main.tf");
        let src = std::fs::read_to_string(&path).unwrap();
        let file = parser::parse_str(&path, &src).unwrap();
        let graph = ModuleGraph::single(dir.clone(), vec![file.clone()]);
        let ctx = ResolutionContext::new(&graph);
        let built = model::build_file(&file, ScopeId::ROOT, &ctx);
        assert_eq!(built.blocks.len(), order.len());

        let blocks: Vec<_> = order.iter().map(|&i| built.blocks[i].clone()).collect();
        let registry = RuleRegistry::builtin().unwrap();
        let raw = Scanner::new(&registry).scan(&blocks, &ctx).findings;
        Policy::from_config(&Config::default())
            .canonicalize(&registry)
            .finalize(raw)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn block_visit_order_does_not_change_findings(
            order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let expected = mixed_in_order(&[0, 1, 2, 3, 4]);
            prop_assert_eq!(expected.len(), 3);
            prop_assert_eq!(mixed_in_order(&order), expected);
        }
    }

    #[test]
    fn repeated_scans_are_identical() {
        let a = scan_fixture("mixed");
        let b = scan_fixture("mixed");
        assert_eq!(a.findings, b.findings);
    }

    #[test]
    fn in_memory_sources() {
        let report = scan_sources(
            Path::new("/virtual"),
            &[
                (
                    "main.tf",
                    "resource \"azurerm_security_center_subscription_pricing\" \"x\" {\n  tier = \"free\"\n}\n",
                ),
                ("broken.tf", "resource {"),
            ],
            &Config::default(),
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.model_errors.len(), 1);
    }

    #[test]
    fn cancelled_scan_is_flagged() {
        let cancellation = ScanCancellation::new();
        cancellation.cancel();
        let options = ScanOptions {
            cancellation: Some(cancellation),
            ..Default::default()
        };
        let report = scan(&fixture("free_tier"), &options).unwrap();
        assert!(report.cancelled);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn renders_every_format() {
        let report = scan_fixture("mixed");
        for format in [OutputFormat::Console, OutputFormat::Json, OutputFormat::Sarif] {
            let rendered = render_report(&report, format, false).unwrap();
            assert!(rendered.contains("enforce-https"), "{format:?}");
        }
    }
}
