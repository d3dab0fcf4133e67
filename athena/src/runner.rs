//! Default sandboxed-runner stand-in.

use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{SnippetOutput, SnippetRunner, StoreView};

/// Refuses every snippet. The real runner is an external collaborator;
/// deployments wire one in through [`crate::Providers`].
pub struct DenyAllRunner;

impl SnippetRunner for DenyAllRunner {
    fn run(&self, _code: &str, _views: &[StoreView]) -> AthenaResult<SnippetOutput> {
        Err(AthenaError::DependencyUnavailable {
            provider: "runner",
            reason: "no sandboxed runner configured".into(),
        })
    }
}
