use crate::config::limits::LimitConfiguration;
use crate::core::worker_count::SettlePolicy;
use crate::error::{ProbeError, Result};
use crate::network::tls::TlsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DOC_URL_PLACEHOLDER: &str = "{doc_url}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Base URI of the document server (http, https, ws or wss)
    pub server_uri: String,
    /// WebSocket path; `{doc_url}` is replaced by the percent-encoded document URL
    pub path_template: String,
    pub limits: LimitConfiguration,
    /// Directory holding the fixture document
    pub fixture_dir: PathBuf,
    pub fixture_name: String,
    /// Where fixture copies are placed (defaults to a directory under the system temp dir)
    pub work_dir: Option<PathBuf>,
    /// Process name of the server's per-document workers
    pub worker_process_name: String,
    pub settle: SettlePolicy,
    pub connect_timeout_secs: u64,
    pub receive_timeout_secs: u64,
    pub load_timeout_secs: u64,
    /// Load saturating documents and wait for `status:` before probing
    pub preload_documents: bool,
    pub client_version: String,
    pub tls: TlsConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            server_uri: "http://127.0.0.1:9980".to_string(),
            path_template: format!("/lool/{DOC_URL_PLACEHOLDER}/ws"),
            limits: LimitConfiguration::default(),
            fixture_dir: PathBuf::from("test/data"),
            fixture_name: "empty.odt".to_string(),
            work_dir: None,
            worker_process_name: "loolkit".to_string(),
            settle: SettlePolicy::default(),
            connect_timeout_secs: 10,
            receive_timeout_secs: 5,
            load_timeout_secs: 10,
            preload_documents: true,
            client_version: "0.1".to_string(),
            tls: TlsConfig::default(),
        }
    }
}

impl SuiteConfig {
    /// Load configuration from file (JSON or YAML based on extension)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| {
                    ProbeError::Config(format!(
                        "failed to parse {} as JSON or YAML: {}",
                        path.display(),
                        e
                    ))
                })?,
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path_template.contains(DOC_URL_PLACEHOLDER) {
            return Err(ProbeError::Config(format!(
                "path template {:?} does not contain {}",
                self.path_template, DOC_URL_PLACEHOLDER
            )));
        }

        if self.fixture_name.trim().is_empty() {
            return Err(ProbeError::Config("fixture name is empty".to_string()));
        }

        if self.worker_process_name.trim().is_empty() {
            return Err(ProbeError::Config(
                "worker process name is empty".to_string(),
            ));
        }

        if self.receive_timeout_secs == 0
            || self.connect_timeout_secs == 0
            || self.load_timeout_secs == 0
        {
            return Err(ProbeError::Config(
                "connect, receive and load timeouts must be at least one second".to_string(),
            ));
        }

        self.tls.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("limitprobe"))
    }

    pub fn fixture_path(&self) -> PathBuf {
        self.fixture_dir.join(&self.fixture_name)
    }
}
