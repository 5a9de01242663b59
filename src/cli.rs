use crate::config::limits::{MAX_CONNECTIONS_ENV, MAX_DOCUMENTS_ENV};
use crate::config::settings::SuiteConfig;
use crate::core::suite::ScenarioKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "limitprobe")]
#[command(about = "Checks that a collaborative document server enforces its document and connection limits")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[arg(
        long,
        short = 's',
        help = "Document server base URI (http, https, ws or wss) [default: http://127.0.0.1:9980]"
    )]
    pub server: Option<String>,

    #[arg(long, help = "Suite configuration file (JSON/YAML)")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = MAX_DOCUMENTS_ENV,
        help = "Maximum number of documents the server keeps open (0 skips the scenario)"
    )]
    pub max_documents: Option<usize>,

    #[arg(
        long,
        env = MAX_CONNECTIONS_ENV,
        help = "Maximum number of connections per document (0 skips the scenario)"
    )]
    pub max_connections: Option<usize>,

    #[arg(long, help = "Run only one scenario")]
    pub only: Option<ScenarioSelection>,

    #[arg(long, help = "Directory holding the fixture document")]
    pub fixture_dir: Option<PathBuf>,

    #[arg(long, help = "Fixture document file name")]
    pub fixture: Option<String>,

    #[arg(long, help = "Directory for per-scenario fixture copies")]
    pub work_dir: Option<PathBuf>,

    #[arg(long, help = "Process name of the server's document workers")]
    pub worker_name: Option<String>,

    #[arg(long, help = "WebSocket path template containing {doc_url}")]
    pub path_template: Option<String>,

    #[arg(long, help = "Connection and upgrade timeout in seconds")]
    pub connect_timeout: Option<u64>,

    #[arg(long, help = "Timeout in seconds for the server's answer to a frame")]
    pub receive_timeout: Option<u64>,

    #[arg(long, help = "Worker count readings before giving up on a settled value")]
    pub settle_attempts: Option<u32>,

    #[arg(long, help = "Open saturating sessions without loading their documents")]
    pub no_preload: bool,

    #[arg(long, short = 'k', help = "Skip TLS certificate verification")]
    pub insecure: bool,

    #[arg(long, help = "Path to client TLS certificate")]
    pub cert: Option<PathBuf>,

    #[arg(long, help = "Path to client TLS certificate private key")]
    pub key: Option<PathBuf>,

    #[arg(long, short = 'o', help = "Write the report to a file (.json for JSON, CSV otherwise)")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        default_value = "detailed",
        help = "Output format (detailed, compact, minimal, json)"
    )]
    pub output_format: OutputFormat,

    #[arg(long, short = 'v', help = "Verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        short = 'q',
        help = "Quiet mode - minimal output (only final summary)"
    )]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioSelection {
    #[value(alias = "max-documents")]
    Documents,
    #[value(alias = "max-connections")]
    Connections,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Detailed,
    Compact,
    Minimal,
    Json,
}

impl ScenarioSelection {
    pub fn kind(&self) -> ScenarioKind {
        match self {
            ScenarioSelection::Documents => ScenarioKind::MaxDocuments,
            ScenarioSelection::Connections => ScenarioKind::MaxConnections,
        }
    }
}

impl Cli {
    /// Overlay command-line values on a loaded or default configuration
    pub fn apply_to(&self, mut config: SuiteConfig) -> SuiteConfig {
        if let Some(server) = &self.server {
            config.server_uri = server.clone();
        }
        if let Some(max_documents) = self.max_documents {
            config.limits.max_documents = max_documents;
        }
        if let Some(max_connections) = self.max_connections {
            config.limits.max_connections = max_connections;
        }
        if let Some(dir) = &self.fixture_dir {
            config.fixture_dir = dir.clone();
        }
        if let Some(name) = &self.fixture {
            config.fixture_name = name.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = Some(dir.clone());
        }
        if let Some(name) = &self.worker_name {
            config.worker_process_name = name.clone();
        }
        if let Some(template) = &self.path_template {
            config.path_template = template.clone();
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.receive_timeout {
            config.receive_timeout_secs = secs;
        }
        if let Some(attempts) = self.settle_attempts {
            config.settle.attempts = attempts;
        }
        if self.no_preload {
            config.preload_documents = false;
        }
        if self.insecure {
            config.tls.insecure = true;
        }
        if self.cert.is_some() || self.key.is_some() {
            config.tls.cert_path = self.cert.clone();
            config.tls.key_path = self.key.clone();
        }
        config
    }

    pub fn selected_kinds(&self) -> Vec<ScenarioKind> {
        match self.only {
            Some(selection) => vec![selection.kind()],
            None => ScenarioKind::ALL.to_vec(),
        }
    }

    /// Default log filter when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}
