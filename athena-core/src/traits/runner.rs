use serde::{Deserialize, Serialize};

use crate::errors::AthenaResult;

/// A read-only view handed to the sandboxed runner. Only ids and rendered
/// content cross the boundary; the runner never holds store references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreView {
    pub layer: String,
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The sandboxed code runner collaborator, invoked only by the `code`
/// operation family. The core exposes read-only views to it.
pub trait SnippetRunner: Send + Sync {
    fn run(&self, code: &str, views: &[StoreView]) -> AthenaResult<SnippetOutput>;
}
