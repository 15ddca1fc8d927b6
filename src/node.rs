//! Coverage nodes: leaves backed by a provider record, and aggregates summed
//! from the leaves beneath them.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::AsyncCache;
use crate::error::{CovtreeError, Result};
use crate::model::{CoverageCounts, CoverageDetail, CoveredCount, FileCoverageRecord};
use crate::provider::CoverageProvider;
use crate::uri::ResourceUri;

#[derive(Debug)]
pub enum CoverageNode {
    Leaf(LeafCoverage),
    Aggregate(AggregateCoverage),
}

impl CoverageNode {
    pub fn uri(&self) -> &ResourceUri {
        match self {
            CoverageNode::Leaf(leaf) => &leaf.uri,
            CoverageNode::Aggregate(agg) => &agg.uri,
        }
    }

    pub fn counts(&self) -> &CoverageCounts {
        match self {
            CoverageNode::Leaf(leaf) => &leaf.counts,
            CoverageNode::Aggregate(agg) => &agg.counts,
        }
    }

    #[must_use]
    pub fn statement(&self) -> CoveredCount {
        self.counts().statement
    }

    #[must_use]
    pub fn branch(&self) -> Option<CoveredCount> {
        self.counts().branch
    }

    #[must_use]
    pub fn function(&self) -> Option<CoveredCount> {
        self.counts().function
    }

    /// Weighted coverage across every present category.
    #[must_use]
    pub fn total_percent(&self) -> f64 {
        self.counts().total_percent()
    }

    /// Leaf view of this node; aggregates have no details to resolve.
    pub fn as_leaf(&self) -> Option<&LeafCoverage> {
        match self {
            CoverageNode::Leaf(leaf) => Some(leaf),
            CoverageNode::Aggregate(_) => None,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, CoverageNode::Leaf(_))
    }
}

/// One file's coverage, able to fetch its line-level details once.
pub struct LeafCoverage {
    uri: ResourceUri,
    counts: CoverageCounts,
    index: usize,
    provider: Arc<dyn CoverageProvider>,
    details: AsyncCache<Arc<[CoverageDetail]>>,
}

impl LeafCoverage {
    pub fn new(record: FileCoverageRecord, provider: Arc<dyn CoverageProvider>) -> Self {
        Self {
            uri: record.uri,
            counts: record.counts,
            index: record.index,
            provider,
            details: AsyncCache::new("file-details"),
        }
    }

    pub fn uri(&self) -> &ResourceUri {
        &self.uri
    }

    pub fn counts(&self) -> &CoverageCounts {
        &self.counts
    }

    /// The provider-assigned index details are resolved by.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Fine-grained coverage for this file.
    ///
    /// Concurrent callers share one provider request; a failed or cancelled
    /// request is forgotten so the next call asks again.
    pub async fn details(&self, token: &CancellationToken) -> Result<Arc<[CoverageDetail]>> {
        let provider = Arc::clone(&self.provider);
        let index = self.index;
        let owned = token.clone();
        let outcome = self
            .details
            .get_or_try_init(token, move || async move {
                let details = tokio::select! {
                    biased;
                    _ = owned.cancelled() => Err(CovtreeError::Cancelled),
                    details = provider.resolve_file_coverage(index, &owned) => details,
                }?;
                Ok(Arc::from(details))
            })
            .await;
        if let Err(err) = &outcome {
            warn!(uri = %self.uri, error = %err, "resolving file details failed");
        }
        outcome
    }

    /// Details if they have already been resolved.
    pub fn cached_details(&self) -> Option<Arc<[CoverageDetail]>> {
        self.details.peek()
    }
}

impl fmt::Debug for LeafCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafCoverage")
            .field("uri", &self.uri)
            .field("counts", &self.counts)
            .field("index", &self.index)
            .field("details_resolved", &self.details.peek().is_some())
            .finish_non_exhaustive()
    }
}

/// A directory, authority or scheme grouping. Counts are the sum of every
/// node beneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCoverage {
    pub uri: ResourceUri,
    pub counts: CoverageCounts,
}
