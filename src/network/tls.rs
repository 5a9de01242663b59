use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_tungstenite::Connector;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Skip TLS certificate verification (test servers use self-signed certificates)
    pub insecure: bool,
    /// Path to client TLS certificate file (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to client TLS private key file (PKCS#8 PEM format)
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        match (&self.cert_path, &self.key_path) {
            (Some(_), None) => {
                return Err(ProbeError::Config(
                    "client certificate given but private key path is missing; --cert and --key must be specified together".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ProbeError::Config(
                    "private key given but client certificate path is missing; --cert and --key must be specified together".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(cert_path) = &self.cert_path {
            check_readable(cert_path, "client certificate")?;
        }
        if let Some(key_path) = &self.key_path {
            check_readable(key_path, "private key")?;
        }

        Ok(())
    }

    pub fn has_client_cert(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }

    /// Build the connector used for `wss://` upgrades.
    pub fn connector(&self) -> Result<Connector> {
        let mut builder = native_tls::TlsConnector::builder();

        if self.insecure {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        if let (Some(cert_path), Some(key_path)) = (&self.cert_path, &self.key_path) {
            let cert_pem = read_pem(cert_path, "client certificate")?;
            let key_pem = read_pem(key_path, "private key")?;

            let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem).map_err(|e| {
                ProbeError::Config(format!(
                    "failed to create TLS identity from certificate {} and key {}: {}",
                    cert_path.display(),
                    key_path.display(),
                    e
                ))
            })?;
            builder.identity(identity);
        }

        let connector = builder
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build TLS connector: {e}")))?;

        Ok(Connector::NativeTls(connector))
    }

    pub fn describe(&self) -> String {
        let mode = if self.insecure {
            "insecure (certificate verification disabled)"
        } else {
            "verify certificates"
        };

        match &self.cert_path {
            Some(cert) if self.has_client_cert() => {
                format!("{mode}, client certificate {}", cert.display())
            }
            _ => mode.to_string(),
        }
    }
}

fn check_readable(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        return Err(ProbeError::Config(format!(
            "{} file not found: {}",
            what,
            path.display()
        )));
    }
    read_pem(path, what).map(|_| ())
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ProbeError::Config(format!("cannot read {} file {}: {}", what, path.display(), e))
    })
}
