use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// A fixture copy and the URL the server uses to open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    local_path: PathBuf,
    doc_url: String,
}

impl DocumentHandle {
    pub fn new(local_path: PathBuf, doc_url: String) -> Self {
        Self {
            local_path,
            doc_url,
        }
    }

    /// Handle for an absolute local path, addressed by its `file://` URL.
    pub fn from_path(local_path: PathBuf) -> Result<Self> {
        let doc_url = Url::from_file_path(&local_path).map_err(|_| {
            ProbeError::Config(format!(
                "document path must be absolute: {}",
                local_path.display()
            ))
        })?;

        Ok(Self {
            local_path,
            doc_url: doc_url.to_string(),
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn doc_url(&self) -> &str {
        &self.doc_url
    }
}

/// Hands out fresh copies of the fixture document, one per handle.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    fixture: PathBuf,
    work_dir: PathBuf,
}

impl FixtureStore {
    pub fn new(fixture: PathBuf, work_dir: PathBuf) -> Self {
        Self { fixture, work_dir }
    }

    /// Copy the fixture under a unique name so the server sees a document it
    /// has never opened before.
    pub fn fresh_handle(&self) -> Result<DocumentHandle> {
        if !self.fixture.is_file() {
            return Err(ProbeError::Fixture(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("fixture document not found: {}", self.fixture.display()),
            )));
        }

        std::fs::create_dir_all(&self.work_dir)?;
        let work_dir = std::fs::canonicalize(&self.work_dir)?;

        let file_name = self
            .fixture
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let target = work_dir.join(format!("{}_{}", Uuid::new_v4().simple(), file_name));

        std::fs::copy(&self.fixture, &target)?;
        DocumentHandle::from_path(target)
    }

    /// Remove the fixture copies made by `fresh_handle`.
    pub fn remove(&self, handle: &DocumentHandle) {
        if let Err(e) = std::fs::remove_file(handle.local_path()) {
            tracing::debug!(
                "could not remove fixture copy {}: {}",
                handle.local_path().display(),
                e
            );
        }
    }
}
