use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tfguard::config::{Config, CONFIG_DIR};
use tfguard::error::ScanError;
use tfguard::output::OutputFormat;
use tfguard::rules::{RuleRegistry, Severity};
use tfguard::ScanOptions;

#[derive(Parser)]
#[command(
    name = "tfguard",
    about = "Static security scanner for Terraform configurations",
    version,
    author
)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a Terraform module for security issues
    Scan {
        /// Module directory or single .tf file
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Config file path (.json, .yml, .yaml or .toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (console, json, sarif)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Minimum severity to fail (low, medium, high, critical)
        #[arg(long)]
        fail_on: Option<String>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Show findings suppressed by configuration
        #[arg(long)]
        include_suppressed: bool,

        /// Extra .tfvars file (repeatable)
        #[arg(long = "var-file")]
        var_files: Vec<PathBuf>,

        /// Glob of files to skip (repeatable)
        #[arg(long = "exclude-path")]
        exclude_paths: Vec<String>,

        /// Stop scanning after this many seconds and report partial results
        #[arg(long, env = "TFGUARD_TIMEOUT")]
        timeout: Option<u64>,

        /// Scan files one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// List all available rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Generate a starter .tfguard/config.yml
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

struct ScanArgs {
    path: PathBuf,
    config: Option<PathBuf>,
    format: String,
    fail_on: Option<String>,
    output: Option<PathBuf>,
    include_suppressed: bool,
    var_files: Vec<PathBuf>,
    exclude_paths: Vec<String>,
    timeout: Option<u64>,
    sequential: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Scan {
            path,
            config,
            format,
            fail_on,
            output,
            include_suppressed,
            var_files,
            exclude_paths,
            timeout,
            sequential,
        } => cmd_scan(ScanArgs {
            path,
            config,
            format,
            fail_on,
            output,
            include_suppressed,
            var_files,
            exclude_paths,
            timeout,
            sequential,
        }),
        Commands::ListRules { format } => cmd_list_rules(format),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tfguard=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn cmd_scan(args: ScanArgs) -> Result<i32, ScanError> {
    let format = OutputFormat::from_str_lenient(&args.format).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", args.format);
        OutputFormat::Console
    });

    let fail_on = args
        .fail_on
        .map(|s| s.parse::<Severity>())
        .transpose()?;

    let options = ScanOptions {
        config_path: args.config,
        format,
        fail_on_override: fail_on,
        var_files: args.var_files,
        exclude_paths: args.exclude_paths,
        timeout: args.timeout.map(Duration::from_secs),
        parallel: !args.sequential,
        cancellation: None,
    };

    let report = tfguard::scan(&args.path, &options)?;
    let rendered = tfguard::render_report(&report, format, args.include_suppressed)?;

    match args.output {
        Some(out) => std::fs::write(&out, &rendered).map_err(|e| {
            ScanError::Output(format!("cannot write report to '{}': {e}", out.display()))
        })?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = findings at or above threshold
    Ok(if report.verdict.pass { 0 } else { 1 })
}

fn cmd_list_rules(format_str: String) -> Result<i32, ScanError> {
    let registry = RuleRegistry::builtin()?;
    let rules = registry.list_rules();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<32} {:<8} {:<18} {:<10} SUMMARY",
                "ID", "PROVIDER", "SERVICE", "SEVERITY"
            );
            println!("{}", "-".repeat(100));
            for rule in &rules {
                println!(
                    "{:<32} {:<8} {:<18} {:<10} {}",
                    rule.id,
                    rule.provider.to_string(),
                    rule.service,
                    rule.default_severity.to_string(),
                    rule.summary,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, ScanError> {
    let path = PathBuf::from(CONFIG_DIR).join("config.yml");

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", path.display());
        return Ok(1);
    }

    std::fs::create_dir_all(CONFIG_DIR)?;
    std::fs::write(&path, Config::starter_yaml())?;
    println!("Created {}", path.display());

    Ok(0)
}
