use serde::{Deserialize, Serialize};

pub const MAX_DOCUMENTS_ENV: &str = "MAX_DOCUMENTS";
pub const MAX_CONNECTIONS_ENV: &str = "MAX_CONNECTIONS";

/// Administrative limits the server under test is expected to enforce.
/// A zero limit disables the corresponding scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LimitConfiguration {
    #[serde(default)]
    pub max_documents: usize,
    #[serde(default)]
    pub max_connections: usize,
}

impl LimitConfiguration {
    pub fn new(max_documents: usize, max_connections: usize) -> Self {
        Self {
            max_documents,
            max_connections,
        }
    }
}
