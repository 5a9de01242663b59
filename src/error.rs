use std::fmt::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Connection refused, unexpected disconnect, malformed response or a
    /// transport-level timeout. Never retried.
    #[error("transport error while {context}: {detail}")]
    Transport { context: String, detail: String },

    #[error("assertion failed: {what} (expected {expected}, got {actual})")]
    Assertion {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("fixture error: {0}")]
    Fixture(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProbeError {
    pub fn transport(context: impl Into<String>, detail: impl Display) -> Self {
        ProbeError::Transport {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    pub fn assertion(
        what: impl Into<String>,
        expected: impl Display,
        actual: impl Display,
    ) -> Self {
        ProbeError::Assertion {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ProbeError::Transport { .. })
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, ProbeError::Assertion { .. })
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProbeError {
    fn from(err: serde_yaml::Error) -> Self {
        ProbeError::Config(err.to_string())
    }
}
