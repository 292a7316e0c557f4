// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lonkero Access - Role-aware access assessment
 * Standalone CLI for multi-tenant authorization testing
 *
 * Features:
 * - Per-role crawling with retry and batching
 * - Permission matrix, escalation, isolation and boundary tests
 * - Form and API payload fuzzing
 * - Hierarchy compliance, role comparison and scored recommendations
 *
 * (c) 2026 Bountyy Oy
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lonkero_access::assessment::{Assessment, AssessmentReport};
use lonkero_access::config::{AppConfig, ConfigFormat, ConfigLoader, ConfigValidator};
use lonkero_access::driver::HttpDriver;
use lonkero_access::rbac::{EscalationPath, PermissionLevel, PermissionRule, RoleDefinition};
use lonkero_access::role::{LoginCredentials, Role};
use lonkero_access::types::Severity;

/// Lonkero Access - role-aware access assessment
#[derive(Parser)]
#[command(name = "lonkero-access")]
#[command(author = "Bountyy Oy <info@bountyy.fi>")]
#[command(version = "1.0.0")]
#[command(about = "Crawl, validate and fuzz a multi-tenant web app once per role.", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - only show errors and the summary
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full assessment
    Run {
        /// Configuration file (yaml, toml or json)
        #[arg(short, long, env = "LONKERO_CONFIG")]
        config: PathBuf,

        /// Report output path (defaults to output.report_path, else stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the access matrix as CSV
        #[arg(long)]
        matrix_csv: Option<PathBuf>,
    },

    /// Validate a configuration file without contacting the target
    Validate {
        #[arg(short, long, env = "LONKERO_CONFIG")]
        config: PathBuf,
    },

    /// Write a sample configuration
    Init {
        /// Output file, format taken from the extension
        #[arg(short, long, default_value = "lonkero-access.yaml")]
        output: PathBuf,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Yaml,
    Toml,
    Json,
}

impl From<FormatArg> for ConfigFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Yaml => ConfigFormat::Yaml,
            FormatArg::Toml => ConfigFormat::Toml,
            FormatArg::Json => ConfigFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Run { config, .. } => Some(
            ConfigLoader::new(config)?
                .load_config()
                .with_context(|| format!("Failed to load {}", config.display()))?,
        ),
        _ => None,
    };
    init_logging(&cli, config.as_ref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("lonkero-access")
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Run {
            output, matrix_csv, ..
        } => match config {
            Some(config) => runtime.block_on(run_assessment(config, output, matrix_csv)),
            None => Err(anyhow::anyhow!("No configuration loaded")),
        },
        Commands::Validate { config } => validate_config(&config),
        Commands::Init { output, format } => generate_config(&output, format),
    }
}

/// Flags win over the configured level; RUST_LOG wins over both
fn init_logging(cli: &Cli, config: Option<&AppConfig>) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        config
            .map(|c| c.observability.log_level.as_str())
            .unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = cli.json_logs || config.is_some_and(|c| c.observability.json_logs);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_assessment(config: AppConfig, output: Option<PathBuf>, matrix_csv: Option<PathBuf>) -> Result<()> {
    let driver = Arc::new(HttpDriver::new(&config.target.base_url));
    let output = output.or_else(|| config.output.report_path.clone());
    let pretty = config.output.pretty;

    let report = Assessment::new(driver, config)
        .run()
        .await
        .context("Assessment aborted")?;

    print_summary(&report);

    if let Some(path) = matrix_csv {
        std::fs::write(&path, report.intelligence.role_comparison.matrix.to_csv())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Access matrix written to: {}", path.display());
    }

    match output {
        Some(path) => {
            report.write_json(&path, pretty)?;
            info!("Report written to: {}", path.display());
        }
        None => println!("{}", report.to_json(pretty)?),
    }
    Ok(())
}

fn validate_config(path: &Path) -> Result<()> {
    let config = ConfigLoader::new(path)?.load_unvalidated()?;
    let report = ConfigValidator::generate_validation_report(&config);
    report.print_report();

    if report.has_errors() {
        error!("Configuration {} is invalid", path.display());
        return Err(anyhow::anyhow!("Configuration validation failed"));
    }
    if report.has_warnings() {
        warn!("Configuration {} is valid with warnings", path.display());
    } else {
        println!("\nConfiguration {} is valid", path.display());
    }
    Ok(())
}

fn sample_config() -> AppConfig {
    let mut config = AppConfig::new(
        "https://app.example.com",
        vec![
            Role::new("readonly_user")
                .with_credentials(LoginCredentials::new("reader@example.com", "change-me"))
                .with_seed_paths(["/dashboard", "/reports"]),
            Role::new("tenant_admin")
                .with_credentials(LoginCredentials::new("admin@example.com", "change-me"))
                .with_seed_paths(["/dashboard", "/admin", "/admin/users"]),
        ],
    );
    config.target.public_paths = vec!["/".to_string(), "/login".to_string()];
    config.permission_rules = vec![
        PermissionRule::new("/reports", "view", PermissionLevel::Read).allow(["readonly_user", "tenant_admin"]),
        PermissionRule::new("/admin/users", "view", PermissionLevel::Admin)
            .allow(["tenant_admin"])
            .deny(["readonly_user"]),
    ];
    config.hierarchy.roles = vec![
        RoleDefinition::new("readonly_user", 1),
        RoleDefinition::new("tenant_admin", 2).inherits("readonly_user"),
    ];
    config.hierarchy.escalation_paths = vec![EscalationPath::new("readonly_user", "tenant_admin")
        .with_methods(&["direct_navigation", "parameter_tampering", "header_injection"])];
    config
}

fn generate_config(output: &Path, format: Option<FormatArg>) -> Result<()> {
    if output.exists() {
        return Err(anyhow::anyhow!("{} already exists", output.display()));
    }
    let loader = match format {
        Some(format) => ConfigLoader::with_format(output, format.into())?,
        None => ConfigLoader::new(output)?,
    };
    loader.save_config(&sample_config())?;
    println!("Sample configuration written to {}", output.display());
    Ok(())
}

fn print_summary(report: &AssessmentReport) {
    let summary = &report.intelligence.executive_summary;
    let count = |severity: Severity| report.vulnerabilities.iter().filter(|v| v.severity == severity).count();

    println!();
    println!("{}", "=".repeat(60));
    println!("ASSESSMENT COMPLETE");
    println!("{}", "=".repeat(60));
    println!("Target:             {}", report.target);
    println!("Roles:              {}", report.crawl_statistics.total_roles);
    println!("Paths tested:       {}", report.crawl_statistics.total_paths_tested);
    println!("RBAC tests:         {}", report.rbac.summary.total_tests);
    println!("Payload tests:      {}", summary.security_tests);
    println!("Hierarchy:          {:.1}%", summary.compliance_score);
    println!("Score:              {:.1} ({})", summary.overall_score, summary.posture);
    println!("Duration:           {:.2}s", report.duration_ms as f64 / 1000.0);
    println!("{}", "-".repeat(60));
    println!("VULNERABILITIES FOUND: {}", report.vulnerabilities.len());

    for (label, severity) in [
        ("[CRITICAL]", Severity::Critical),
        ("[HIGH]    ", Severity::High),
        ("[MEDIUM]  ", Severity::Medium),
        ("[LOW]     ", Severity::Low),
    ] {
        let n = count(severity);
        if n > 0 {
            println!("  {} {}", label, n);
        }
    }

    for vuln in &report.vulnerabilities {
        println!();
        println!("[{}] {}", vuln.severity, vuln.vuln_type);
        println!("  Role:      {}", vuln.role);
        println!("  Resource:  {}", vuln.resource);
        println!("  CWE:       {}", vuln.cwe);
    }

    if !report.intelligence.recommendations.is_empty() {
        println!("{}", "-".repeat(60));
        println!("TOP RECOMMENDATIONS");
        for insight in report.intelligence.recommendations.iter().take(5) {
            println!("  {} [{:?}] {}", insight.id, insight.priority, insight.title);
        }
    }
    println!("{}", "=".repeat(60));
}
