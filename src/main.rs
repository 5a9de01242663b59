#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::Parser;
use limitprobe::{
    cli::{Cli, OutputFormat},
    LimitProbeSuite, ProcfsInventory, ReportExporter, SuiteConfig,
};
use tracing_subscriber::EnvFilter;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("limitprobe={}", cli.log_level())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<SuiteConfig> {
    let base = match &cli.config {
        Some(path) => SuiteConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SuiteConfig::default(),
    };

    let config = cli.apply_to(base);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_intro(config: &SuiteConfig) {
    println!("🚀 Probing resource limits on {}", config.server_uri);
    println!(
        "   Limits: {} documents, {} connections per document",
        config.limits.max_documents, config.limits.max_connections
    );
    println!(
        "   Fixture: {} (worker process: {})",
        config.fixture_path().display(),
        config.worker_process_name
    );
    if config.tls.insecure || config.tls.has_client_cert() {
        println!("   TLS: {}", config.tls.describe());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(&cli)?;
    let quiet = cli.quiet || cli.output_format == OutputFormat::Json;
    if !quiet {
        print_intro(&config);
    }

    let inventory = ProcfsInventory::new(config.worker_process_name.clone());
    let suite = LimitProbeSuite::new(config, inventory).context("Failed to set up limit probe")?;
    let report = suite.run_only(&cli.selected_kinds()).await;

    match cli.output_format {
        OutputFormat::Json => ReportExporter::new(&report).print_json(),
        _ if cli.quiet => report.print_minimal_summary(),
        OutputFormat::Detailed => report.print_summary(),
        OutputFormat::Compact => report.print_compact_summary(),
        OutputFormat::Minimal => report.print_minimal_summary(),
    }

    if let Some(path) = &cli.output {
        ReportExporter::new(&report).export(path)?;
        if !quiet {
            println!("\n💾 Report written to {}", path.display());
        }
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
