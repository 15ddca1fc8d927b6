//! The provider contract and report-backed providers.
//!
//! A provider hands out the flat list of per-file records once per session
//! and resolves fine-grained details for one file on demand, by the index
//! it stamped on that file's record.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::detect::{detect_format, Format};
use crate::error::{CovtreeError, Result};
use crate::model::{CoverageDetail, FileCoverageRecord};
use crate::parsers::{self, ParsedFile};
use crate::uri::ResourceUri;

#[async_trait]
pub trait CoverageProvider: Send + Sync {
    /// Flat list of every file covered by the run.
    async fn provide_file_coverage(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<FileCoverageRecord>>;

    /// Fine-grained details for the file whose record carried `index`.
    async fn resolve_file_coverage(
        &self,
        index: usize,
        token: &CancellationToken,
    ) -> Result<Vec<CoverageDetail>>;
}

struct ReportEntry {
    record: FileCoverageRecord,
    details: Arc<[CoverageDetail]>,
}

/// In-memory provider over already-parsed report files. A record's index is
/// its position in the listing.
pub struct ReportProvider {
    entries: Vec<ReportEntry>,
}

impl ReportProvider {
    /// Blocks of the same file (repeated `SF:` sections, several classes
    /// sharing a filename) are folded into one record.
    pub fn new(files: Vec<ParsedFile>) -> Self {
        let mut folded: Vec<(ResourceUri, ParsedFile)> = Vec::with_capacity(files.len());
        let mut seen: HashMap<ResourceUri, usize> = HashMap::new();
        for file in files {
            let uri = ResourceUri::file(&file.path);
            match seen.get(&uri) {
                Some(&position) => {
                    debug!(%uri, "folding repeated file block");
                    folded[position].1.absorb(file);
                }
                None => {
                    seen.insert(uri.clone(), folded.len());
                    folded.push((uri, file));
                }
            }
        }

        let entries = folded
            .into_iter()
            .enumerate()
            .map(|(index, (uri, file))| {
                let details = file.into_details();
                ReportEntry {
                    record: FileCoverageRecord::from_details(uri, &details).with_index(index),
                    details: details.into(),
                }
            })
            .collect();
        Self { entries }
    }

    pub fn records(&self) -> Vec<FileCoverageRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    pub fn details(&self, index: usize) -> Result<Vec<CoverageDetail>> {
        self.entries
            .get(index)
            .map(|e| e.details.to_vec())
            .ok_or(CovtreeError::FileIndex(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CoverageProvider for ReportProvider {
    async fn provide_file_coverage(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<FileCoverageRecord>> {
        Ok(self.records())
    }

    async fn resolve_file_coverage(
        &self,
        index: usize,
        _token: &CancellationToken,
    ) -> Result<Vec<CoverageDetail>> {
        self.details(index)
    }
}

#[derive(Default)]
struct Listings {
    /// Report read by each listing, keyed by the first index it handed out.
    by_base: BTreeMap<usize, Arc<ReportProvider>>,
    next_base: usize,
}

/// Provider that reads a coverage report from disk each time the file list
/// is requested.
///
/// Every listing gets its own index range, so a record's details always come
/// from the read that produced the record, even after the report on disk
/// changes and a later listing reads it again.
pub struct ReportFileProvider {
    path: PathBuf,
    format: Option<Format>,
    listings: Mutex<Listings>,
}

impl ReportFileProvider {
    /// `format` overrides detection when given.
    pub fn new(path: impl Into<PathBuf>, format: Option<Format>) -> Self {
        Self {
            path: path.into(),
            format,
            listings: Mutex::new(Listings::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<ReportProvider> {
        let content = tokio::fs::read(&self.path).await?;
        let format = match self.format {
            Some(format) => format,
            None => detect_format(&self.path, &content).ok_or(CovtreeError::UnknownFormat)?,
        };
        debug!(path = %self.path.display(), %format, "parsing coverage report");
        let files = parsers::parse_with_format(format, &content)?;
        let report = ReportProvider::new(files);
        info!(
            path = %self.path.display(),
            files = report.len(),
            "loaded coverage report"
        );
        Ok(report)
    }
}

#[async_trait]
impl CoverageProvider for ReportFileProvider {
    async fn provide_file_coverage(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<FileCoverageRecord>> {
        let report = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CovtreeError::Cancelled),
            report = self.load() => Arc::new(report?),
        };
        let base = {
            let mut listings = self.listings.lock();
            let base = listings.next_base;
            listings.next_base += report.len();
            listings.by_base.insert(base, Arc::clone(&report));
            base
        };
        Ok(report
            .records()
            .into_iter()
            .map(|record| {
                let index = base + record.index;
                record.with_index(index)
            })
            .collect())
    }

    async fn resolve_file_coverage(
        &self,
        index: usize,
        token: &CancellationToken,
    ) -> Result<Vec<CoverageDetail>> {
        if token.is_cancelled() {
            return Err(CovtreeError::Cancelled);
        }
        let (base, report) = self
            .listings
            .lock()
            .by_base
            .range(..=index)
            .next_back()
            .map(|(base, report)| (*base, Arc::clone(report)))
            .ok_or(CovtreeError::FileIndex(index))?;
        report
            .details(index - base)
            .map_err(|_| CovtreeError::FileIndex(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoveredCount;
    use crate::parsers::{cobertura, lcov};

    const LCOV: &[u8] = b"SF:/src/lib.rs\nDA:1,1\nDA:2,0\nFN:1,main\nFNDA:1,main\nend_of_record\n\
SF:/src/util.rs\nDA:1,0\nend_of_record\n";

    #[tokio::test]
    async fn test_report_provider_records_and_details() {
        let provider = ReportProvider::new(lcov::parse(LCOV).unwrap());
        let token = CancellationToken::new();

        let records = provider.provide_file_coverage(&token).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uri, ResourceUri::file("/src/lib.rs"));
        assert_eq!(records[0].counts.statement.covered, 1);
        assert_eq!(records[0].counts.statement.total, 2);
        assert_eq!(records[0].counts.function.map(|f| f.covered), Some(1));
        assert_eq!(records[1].counts.function, None);

        let details = provider.resolve_file_coverage(0, &token).await.unwrap();
        assert_eq!(details.len(), 3);

        let err = provider.resolve_file_coverage(5, &token).await.unwrap_err();
        assert!(matches!(err, CovtreeError::FileIndex(5)));
    }

    #[tokio::test]
    async fn test_file_provider_requires_load_before_resolve() {
        let provider = ReportFileProvider::new("/does/not/exist.lcov", None);
        let token = CancellationToken::new();
        assert!(provider.resolve_file_coverage(0, &token).await.is_err());
        let err = provider.provide_file_coverage(&token).await.unwrap_err();
        assert!(matches!(err, CovtreeError::Io(_)));
    }

    #[tokio::test]
    async fn test_file_provider_honours_cancellation() {
        let provider = ReportFileProvider::new("/does/not/exist.lcov", None);
        let token = CancellationToken::new();
        token.cancel();
        let err = provider.provide_file_coverage(&token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_repeated_lcov_sections_fold() {
        let lcov = b"TN:a\nSF:/src/a.rs\nDA:1,0\nDA:2,1\nend_of_record\n\
TN:b\nSF:/src/a.rs\nDA:1,4\nDA:3,0\nend_of_record\n\
SF:/src/b.rs\nDA:1,1\nend_of_record\n";
        let provider = ReportProvider::new(lcov::parse(lcov).unwrap());
        let records = provider.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uri, ResourceUri::file("/src/a.rs"));
        assert_eq!(records[0].counts.statement, CoveredCount::new(2, 3));
        assert_eq!(records[1].index, 1);
        assert_eq!(provider.details(0).unwrap().len(), 3);
    }

    #[test]
    fn test_classes_sharing_a_filename_fold() {
        let xml = br#"<coverage><packages><package><classes>
<class name="Foo" filename="/src/Foo.cs"><lines>
  <line number="1" hits="1"/>
  <line number="2" hits="0" branch="true" condition-coverage="50% (1/2)"/>
</lines></class>
<class name="Foo+Inner" filename="/src/Foo.cs"><lines>
  <line number="2" hits="3" branch="true" condition-coverage="100% (2/2)"/>
  <line number="9" hits="0"/>
</lines></class>
</classes></package></packages></coverage>"#;
        let provider = ReportProvider::new(cobertura::parse(xml).unwrap());
        let records = provider.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].counts.statement, CoveredCount::new(2, 3));
        assert_eq!(records[0].counts.branch, Some(CoveredCount::new(2, 2)));
    }

    #[tokio::test]
    async fn test_details_follow_the_listing_that_produced_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coverage.info");
        std::fs::write(&path, "SF:/a.rs\nDA:1,1\nend_of_record\nSF:/b.rs\nDA:1,0\nDA:2,0\nend_of_record\n")
            .unwrap();
        let provider = ReportFileProvider::new(&path, None);
        let token = CancellationToken::new();

        let first = provider.provide_file_coverage(&token).await.unwrap();
        let b_first = first.iter().find(|r| r.uri == ResourceUri::file("/b.rs")).unwrap();

        std::fs::write(&path, "SF:/c.rs\nDA:1,1\nDA:2,1\nDA:3,1\nend_of_record\nSF:/b.rs\nDA:1,1\nend_of_record\n")
            .unwrap();
        let second = provider.provide_file_coverage(&token).await.unwrap();
        assert!(second.iter().all(|r| first.iter().all(|f| f.index != r.index)));

        // The first listing's index still resolves against the first read.
        let details = provider.resolve_file_coverage(b_first.index, &token).await.unwrap();
        assert_eq!(details.len(), 2);

        let c = second.iter().find(|r| r.uri == ResourceUri::file("/c.rs")).unwrap();
        let details = provider.resolve_file_coverage(c.index, &token).await.unwrap();
        assert_eq!(details.len(), 3);

        let err = provider.resolve_file_coverage(99, &token).await.unwrap_err();
        assert!(matches!(err, CovtreeError::FileIndex(99)));
    }
}
