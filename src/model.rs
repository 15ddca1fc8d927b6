//! Coverage data shared by the tree, the providers and the presentation
//! layer: per-category counts, per-file records, and fine-grained details.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::error::{CovtreeError, Result};
use crate::uri::ResourceUri;

/// Fraction of `covered` over `total`. A category with nothing to cover is
/// reported as fully covered.
#[must_use]
pub fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// Covered/total pair for one coverage category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoveredCount {
    pub covered: u64,
    pub total: u64,
}

impl CoveredCount {
    #[must_use]
    pub fn new(covered: u64, total: u64) -> Self {
        debug_assert!(covered <= total, "covered ({covered}) exceeds total ({total})");
        Self { covered, total }
    }

    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.covered, self.total)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.covered <= self.total
    }

    /// Count one unit, covered when `hits > 0`.
    pub fn record(&mut self, hits: u64) {
        self.total += 1;
        if hits > 0 {
            self.covered += 1;
        }
    }
}

impl Add for CoveredCount {
    type Output = CoveredCount;

    fn add(self, rhs: CoveredCount) -> CoveredCount {
        CoveredCount {
            covered: self.covered + rhs.covered,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for CoveredCount {
    fn add_assign(&mut self, rhs: CoveredCount) {
        self.covered += rhs.covered;
        self.total += rhs.total;
    }
}

impl Sum for CoveredCount {
    fn sum<I: Iterator<Item = CoveredCount>>(iter: I) -> Self {
        iter.fold(CoveredCount::default(), Add::add)
    }
}

/// The three coverage categories carried by every node. `statement` is
/// always present; `branch` and `function` only when something reported them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageCounts {
    pub statement: CoveredCount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<CoveredCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<CoveredCount>,
}

impl CoverageCounts {
    /// Add `other` into `self`. A category absent here but present in
    /// `other` starts from zero, so presence spreads upward.
    pub fn accumulate(&mut self, other: &CoverageCounts) {
        self.statement += other.statement;
        accumulate_optional(&mut self.branch, other.branch);
        accumulate_optional(&mut self.function, other.function);
    }

    fn present(&self) -> impl Iterator<Item = CoveredCount> {
        std::iter::once(self.statement)
            .chain(self.branch)
            .chain(self.function)
    }

    /// Total percent covered: covered units over total units across every
    /// present category, 1.0 when there is nothing to cover.
    #[must_use]
    pub fn total_percent(&self) -> f64 {
        let sum: CoveredCount = self.present().sum();
        sum.percent()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.present().all(|c| c.is_valid())
    }
}

fn accumulate_optional(target: &mut Option<CoveredCount>, source: Option<CoveredCount>) {
    if let Some(source) = source {
        *target.get_or_insert_with(CoveredCount::default) += source;
    }
}

/// Raw coverage for one file as handed out by a provider. `index` is the
/// provider's handle for resolving the file's details later.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCoverageRecord {
    pub uri: ResourceUri,
    pub counts: CoverageCounts,
    pub index: usize,
}

impl FileCoverageRecord {
    pub fn new(uri: ResourceUri, counts: CoverageCounts) -> Self {
        Self {
            uri,
            counts,
            index: 0,
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Derive the record's counts from its fine-grained details.
    pub fn from_details(uri: ResourceUri, details: &[CoverageDetail]) -> Self {
        let mut counts = CoverageCounts::default();
        for detail in details {
            match detail {
                CoverageDetail::Statement(stmt) => {
                    counts.statement.record(stmt.hits);
                    for arm in &stmt.branches {
                        counts
                            .branch
                            .get_or_insert_with(CoveredCount::default)
                            .record(arm.hits);
                    }
                }
                CoverageDetail::Function(func) => {
                    counts
                        .function
                        .get_or_insert_with(CoveredCount::default)
                        .record(func.hits);
                }
            }
        }
        Self::new(uri, counts)
    }

    /// Reject records that break `covered <= total`.
    pub fn validate(&self) -> Result<()> {
        if self.counts.is_valid() {
            Ok(())
        } else {
            Err(CovtreeError::Provider(format!(
                "record for {} has more covered than total units",
                self.uri
            )))
        }
    }
}

/// One arm of a branching statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchCoverage {
    pub hits: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// An instrumented line, with the branch arms it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementCoverage {
    pub line: u32,
    pub hits: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchCoverage>,
}

impl StatementCoverage {
    #[must_use]
    pub fn branches_taken(&self) -> usize {
        self.branches.iter().filter(|b| b.hits > 0).count()
    }
}

/// An instrumented function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCoverage {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub hits: u64,
}

/// Fine-grained coverage entry resolved on demand for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CoverageDetail {
    Statement(StatementCoverage),
    Function(FunctionCoverage),
}

impl CoverageDetail {
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        match self {
            CoverageDetail::Statement(stmt) => Some(stmt.line),
            CoverageDetail::Function(func) => func.line,
        }
    }
}
