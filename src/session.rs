//! A coverage session: the tree for one test run, built on first use.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregate::CoverageTree;
use crate::cache::AsyncCache;
use crate::error::{CovtreeError, Result};
use crate::node::CoverageNode;
use crate::provider::CoverageProvider;
use crate::uri::ResourceUri;

pub struct CoverageSession {
    provider: Arc<dyn CoverageProvider>,
    tree: AsyncCache<Arc<CoverageTree>>,
}

impl CoverageSession {
    pub fn new(provider: Arc<dyn CoverageProvider>) -> Self {
        Self {
            provider,
            tree: AsyncCache::new("coverage-tree"),
        }
    }

    /// The fully aggregated tree.
    ///
    /// The first call asks the provider for the file list and builds the
    /// tree; calls made meanwhile wait on that same build. Once built, the
    /// same tree is returned for the life of the session. A failed or
    /// cancelled build is reported to everyone waiting on it and the next
    /// call starts over.
    ///
    /// The build runs under the token of the call that started it. Once that
    /// token is cancelled, a call with a live token starts a new build
    /// rather than joining the doomed one.
    pub async fn all_files(&self, token: &CancellationToken) -> Result<Arc<CoverageTree>> {
        let provider = Arc::clone(&self.provider);
        let owned = token.clone();
        let outcome = self
            .tree
            .get_or_try_init(token, move || async move {
                let records = tokio::select! {
                    biased;
                    _ = owned.cancelled() => Err(CovtreeError::Cancelled),
                    records = provider.provide_file_coverage(&owned) => records,
                }?;
                debug!(files = records.len(), "provider listed files");
                CoverageTree::build(records, &provider).map(Arc::new)
            })
            .await;
        if let Err(err) = &outcome {
            warn!(error = %err, "building coverage tree failed");
        }
        outcome
    }

    /// Node stored under `uri`, or `None` if the run has no such position.
    pub async fn get_uri(
        &self,
        uri: &ResourceUri,
        token: &CancellationToken,
    ) -> Result<Option<Arc<CoverageNode>>> {
        let tree = self.all_files(token).await?;
        Ok(tree.get(uri))
    }

    /// The tree, if a build has already succeeded.
    pub fn cached_tree(&self) -> Option<Arc<CoverageTree>> {
        self.tree.peek()
    }

    /// Number of builds started so far.
    #[must_use]
    pub fn build_attempts(&self) -> u64 {
        self.tree.attempts()
    }
}
