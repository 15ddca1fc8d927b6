#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use covtree::error::{CovtreeError, Result};
use covtree::model::{
    CoverageCounts, CoverageDetail, CoveredCount, FileCoverageRecord, StatementCoverage,
};
use covtree::provider::CoverageProvider;
use covtree::uri::ResourceUri;

/// Provider with call counters, failure injection, and an optional gate
/// that holds every call until permits are added.
pub struct MockProvider {
    records: Vec<FileCoverageRecord>,
    pub list_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    fail_lists: AtomicUsize,
    fail_resolves: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockProvider {
    pub fn new(records: Vec<FileCoverageRecord>) -> Self {
        Self {
            records,
            list_calls: AtomicUsize::new(0),
            resolve_calls: AtomicUsize::new(0),
            fail_lists: AtomicUsize::new(0),
            fail_resolves: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Calls block until the returned semaphore receives permits.
    pub fn gated(records: Vec<FileCoverageRecord>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut provider = Self::new(records);
        provider.gate = Some(Arc::clone(&gate));
        (provider, gate)
    }

    /// The next `n` file listings fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.fail_lists.store(n, Ordering::SeqCst);
    }

    /// The next `n` detail resolutions fail.
    pub fn fail_next_resolves(&self, n: usize) {
        self.fail_resolves.store(n, Ordering::SeqCst);
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self) -> Result<()> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| CovtreeError::Provider(e.to_string()))?;
            permit.forget();
        }
        Ok(())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CoverageProvider for MockProvider {
    async fn provide_file_coverage(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<FileCoverageRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await?;
        if Self::take_failure(&self.fail_lists) {
            return Err(CovtreeError::Provider("listing failed".to_string()));
        }
        Ok(self.records.clone())
    }

    async fn resolve_file_coverage(
        &self,
        index: usize,
        _token: &CancellationToken,
    ) -> Result<Vec<CoverageDetail>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await?;
        if Self::take_failure(&self.fail_resolves) {
            return Err(CovtreeError::Provider("resolve failed".to_string()));
        }
        let record = self.records.get(index).ok_or(CovtreeError::FileIndex(index))?;
        let total = record.counts.statement.total;
        let covered = record.counts.statement.covered;
        Ok((1..=total)
            .map(|line| {
                CoverageDetail::Statement(StatementCoverage {
                    line: line as u32,
                    hits: u64::from(line <= covered),
                    branches: Vec::new(),
                })
            })
            .collect())
    }
}

pub fn record(path: &str, covered: u64, total: u64) -> FileCoverageRecord {
    FileCoverageRecord::new(
        ResourceUri::file(path),
        CoverageCounts {
            statement: CoveredCount::new(covered, total),
            branch: None,
            function: None,
        },
    )
}

/// Records indexed by their position, the way `MockProvider` resolves them.
pub fn indexed(records: Vec<FileCoverageRecord>) -> Vec<FileCoverageRecord> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.with_index(index))
        .collect()
}

pub fn sample_records() -> Vec<FileCoverageRecord> {
    indexed(vec![
        record("/a/b/x", 1, 2),
        record("/a/b/y", 3, 4),
        record("/c/z", 5, 5),
    ])
}

/// Write `content` into a fresh temp dir under `name`.
/// The caller must hold onto `TempDir` to keep the file alive.
pub fn write_report(name: &str, content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
