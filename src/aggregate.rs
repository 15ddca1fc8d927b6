//! The aggregated coverage tree.
//!
//! Leaves are inserted under their decomposed URI. Every other position is
//! then filled bottom-up with an aggregate summing its children, each
//! position computed exactly once.

use std::sync::Arc;

use tracing::debug;

use crate::error::{CovtreeError, Result};
use crate::model::{CoverageCounts, FileCoverageRecord};
use crate::node::{AggregateCoverage, CoverageNode, LeafCoverage};
use crate::provider::CoverageProvider;
use crate::tree::{NodeRef, PositionId, PrefixTree};
use crate::uri::ResourceUri;

#[derive(Debug, Default)]
pub struct CoverageTree {
    tree: PrefixTree<Arc<CoverageNode>>,
    leaves: usize,
}

impl CoverageTree {
    /// Insert one leaf per record and aggregate the positions above them.
    /// Each leaf resolves its details through the record's index.
    pub fn build(
        records: Vec<FileCoverageRecord>,
        provider: &Arc<dyn CoverageProvider>,
    ) -> Result<Self> {
        let mut tree = PrefixTree::new();
        let leaves = records.len();
        for record in records {
            record.validate()?;
            let key = record.uri.segments();
            let uri = record.uri.to_string();
            let leaf = LeafCoverage::new(record, Arc::clone(provider));
            if tree
                .insert(key, Arc::new(CoverageNode::Leaf(leaf)))
                .is_some()
            {
                return Err(CovtreeError::DuplicateFile(uri));
            }
        }

        let mut built = Self { tree, leaves };
        let aggregates = built.fill_aggregates()?;
        debug!(leaves, aggregates, "built coverage tree");
        Ok(built)
    }

    /// Post-order pass giving every value-less position an aggregate.
    /// Returns how many aggregates were created.
    fn fill_aggregates(&mut self) -> Result<usize> {
        let mut created = 0;
        for id in self.tree.post_order() {
            if self.tree.value(id).is_some() {
                continue;
            }
            let counts = self.sum_children(id);
            let uri = ResourceUri::from_segments(&self.tree.path(id))?;
            self.tree.set_value(
                id,
                Arc::new(CoverageNode::Aggregate(AggregateCoverage { uri, counts })),
            );
            created += 1;
        }
        Ok(created)
    }

    fn sum_children(&self, id: PositionId) -> CoverageCounts {
        let mut counts = CoverageCounts::default();
        for child in self.tree.children(id) {
            // Post-order guarantees every child already holds a node.
            if let Some(node) = self.tree.value(child) {
                counts.accumulate(node.counts());
            }
        }
        counts
    }

    /// Node stored under exactly this URI.
    pub fn get(&self, uri: &ResourceUri) -> Option<Arc<CoverageNode>> {
        self.tree.get(uri.segments()).cloned()
    }

    /// Every position in pre-order, paired with its path.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_, Arc<CoverageNode>>> + '_ {
        self.tree.nodes()
    }

    /// Every leaf in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = &LeafCoverage> + '_ {
        self.tree
            .nodes()
            .filter_map(|n| n.value())
            .filter_map(|node| node.as_leaf())
    }

    /// Direct children of the node at `uri`, or the top-level nodes when
    /// `uri` is `None`.
    pub fn children(&self, uri: Option<&ResourceUri>) -> Vec<Arc<CoverageNode>> {
        let parent = match uri {
            Some(uri) => self.tree.find(uri.segments()),
            None => Some(PositionId::ROOT),
        };
        parent
            .map(|id| {
                self.tree
                    .children(id)
                    .filter_map(|child| self.tree.value(child).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum over the whole run.
    #[must_use]
    pub fn totals(&self) -> CoverageCounts {
        self.sum_children(PositionId::ROOT)
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.leaves
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoveredCount;
    use crate::provider::ReportProvider;

    fn provider() -> Arc<dyn CoverageProvider> {
        Arc::new(ReportProvider::new(Vec::new()))
    }

    fn record(path: &str, statement: (u64, u64)) -> FileCoverageRecord {
        FileCoverageRecord::new(
            ResourceUri::file(path),
            CoverageCounts {
                statement: CoveredCount::new(statement.0, statement.1),
                branch: None,
                function: None,
            },
        )
    }

    #[test]
    fn test_aggregates_sum_children() {
        let tree = CoverageTree::build(
            vec![record("/a/b/x", (1, 2)), record("/a/b/y", (3, 4))],
            &provider(),
        )
        .unwrap();

        let ab = tree.get(&ResourceUri::file("/a/b")).unwrap();
        assert!(!ab.is_leaf());
        assert_eq!(ab.statement(), CoveredCount::new(4, 6));

        let a = tree.get(&ResourceUri::file("/a")).unwrap();
        assert_eq!(a.counts(), ab.counts());
        assert_eq!(tree.totals().statement, CoveredCount::new(4, 6));
    }

    #[test]
    fn test_leaf_is_never_overwritten() {
        let tree = CoverageTree::build(
            vec![record("/a/b", (1, 1)), record("/a/b/c", (0, 5))],
            &provider(),
        )
        .unwrap();
        let ab = tree.get(&ResourceUri::file("/a/b")).unwrap();
        assert!(ab.is_leaf());
        assert_eq!(ab.statement(), CoveredCount::new(1, 1));
        // The parent sums the leaf, not the leaf's would-be children.
        let a = tree.get(&ResourceUri::file("/a")).unwrap();
        assert_eq!(a.statement(), CoveredCount::new(1, 1));
    }

    #[test]
    fn test_optional_categories_spread_upward() {
        let mut with_branches = record("/src/x.rs", (1, 1));
        with_branches.counts.branch = Some(CoveredCount::new(0, 0));
        let tree = CoverageTree::build(
            vec![with_branches, record("/src/y.rs", (0, 1)), record("/lib/z.rs", (1, 1))],
            &provider(),
        )
        .unwrap();

        let src = tree.get(&ResourceUri::file("/src")).unwrap();
        assert_eq!(src.branch(), Some(CoveredCount::new(0, 0)));
        assert_eq!(src.function(), None);

        let lib = tree.get(&ResourceUri::file("/lib")).unwrap();
        assert_eq!(lib.branch(), None);
    }

    #[test]
    fn test_every_position_has_a_node() {
        let tree = CoverageTree::build(
            vec![record("/a/b/x", (1, 2)), record("/c", (0, 1))],
            &provider(),
        )
        .unwrap();
        assert!(tree.nodes().all(|n| n.value().is_some()));
        assert_eq!(tree.leaves().count(), 2);
        assert_eq!(tree.file_count(), 2);

        let scheme = tree.get(&ResourceUri::new("file", "", "")).unwrap();
        assert_eq!(scheme.statement(), CoveredCount::new(1, 3));
    }

    #[test]
    fn test_duplicate_leaf_rejected() {
        let err = CoverageTree::build(
            vec![record("/a.rs", (1, 1)), record("/a.rs", (0, 1))],
            &provider(),
        )
        .unwrap_err();
        assert!(matches!(err, CovtreeError::DuplicateFile(_)));
    }

    #[test]
    fn test_children_listing() {
        let tree = CoverageTree::build(
            vec![record("/a/x", (1, 1)), record("/a/y", (0, 1))],
            &provider(),
        )
        .unwrap();
        let kids = tree.children(Some(&ResourceUri::file("/a")));
        let labels: Vec<&str> = kids.iter().map(|n| n.uri().label()).collect();
        assert_eq!(labels, vec!["x", "y"]);
        assert_eq!(tree.children(None).len(), 1);
        assert!(tree.children(Some(&ResourceUri::file("/missing"))).is_empty());
    }

    #[test]
    fn test_each_position_aggregated_once() {
        let provider = provider();
        let mut tree = PrefixTree::new();
        for record in [
            record("/a/b/x", (1, 2)),
            record("/a/b/y", (3, 4)),
            record("/a/c", (0, 1)),
            record("/d", (1, 1)),
        ] {
            let key = record.uri.segments();
            let leaf = LeafCoverage::new(record, Arc::clone(&provider));
            tree.insert(key, Arc::new(CoverageNode::Leaf(leaf)));
        }
        let mut built = CoverageTree { tree, leaves: 4 };
        let empty = built.tree.nodes().filter(|n| n.value().is_none()).count();
        // file, file/"", file/""/"", a, a/b
        assert_eq!(empty, 5);

        assert_eq!(built.fill_aggregates().unwrap(), empty);
        assert!(built.tree.nodes().all(|n| n.value().is_some()));
        assert_eq!(built.fill_aggregates().unwrap(), 0);

        let a = built.get(&ResourceUri::file("/a")).unwrap();
        assert_eq!(a.statement(), CoveredCount::new(4, 7));
    }
}
