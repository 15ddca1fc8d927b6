pub mod cobertura;
pub mod lcov;

use std::collections::BTreeMap;

use tracing::debug;

use crate::detect::Format;
use crate::error::Result;
use crate::model::{BranchCoverage, CoverageDetail, FunctionCoverage, StatementCoverage};

/// Coverage collected for one source file while parsing a report.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub path: String,
    pub statements: BTreeMap<u32, StatementCoverage>,
    pub functions: Vec<FunctionCoverage>,
    /// Branch arms seen on lines that have no line record (yet).
    unattached: BTreeMap<u32, Vec<BranchCoverage>>,
}

impl ParsedFile {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    /// Record a line hit. A line reported twice keeps its highest count.
    pub fn record_line(&mut self, line: u32, hits: u64) {
        let arms = self.unattached.remove(&line);
        let stmt = self
            .statements
            .entry(line)
            .or_insert_with(|| StatementCoverage {
                line,
                hits: 0,
                branches: Vec::new(),
            });
        stmt.hits = stmt.hits.max(hits);
        if let Some(arms) = arms {
            stmt.branches.extend(arms);
        }
    }

    /// Append a branch arm to the statement on `line`. Arms never create a
    /// statement: until the line itself is recorded they are held aside, and
    /// arms whose line is never recorded are dropped.
    pub fn record_branch(&mut self, line: u32, hits: u64, label: Option<String>) {
        let arm = BranchCoverage { hits, label };
        match self.statements.get_mut(&line) {
            Some(stmt) => stmt.branches.push(arm),
            None => self.unattached.entry(line).or_default().push(arm),
        }
    }

    #[must_use]
    pub fn has_branches(&self, line: u32) -> bool {
        self.statements
            .get(&line)
            .is_some_and(|s| !s.branches.is_empty())
            || self.unattached.contains_key(&line)
    }

    pub fn record_function(&mut self, name: String, line: Option<u32>, hits: u64) {
        self.functions.push(FunctionCoverage { name, line, hits });
    }

    /// Fold another block for the same file into this one. Lines, branch
    /// arms (by position) and functions (by name and line) keep the highest
    /// hit count.
    pub fn absorb(&mut self, other: ParsedFile) {
        for (line, stmt) in other.statements {
            self.record_line(line, stmt.hits);
            self.merge_branches(line, stmt.branches);
        }
        for (line, arms) in other.unattached {
            self.merge_branches(line, arms);
        }
        for func in other.functions {
            let existing = self
                .functions
                .iter_mut()
                .find(|f| f.name == func.name && f.line == func.line);
            match existing {
                Some(existing) => existing.hits = existing.hits.max(func.hits),
                None => self.functions.push(func),
            }
        }
    }

    fn merge_branches(&mut self, line: u32, arms: Vec<BranchCoverage>) {
        if arms.is_empty() {
            return;
        }
        let target = match self.statements.get_mut(&line) {
            Some(stmt) => &mut stmt.branches,
            None => self.unattached.entry(line).or_default(),
        };
        for (position, arm) in arms.into_iter().enumerate() {
            match target.get_mut(position) {
                Some(existing) => existing.hits = existing.hits.max(arm.hits),
                None => target.push(arm),
            }
        }
    }

    /// Statements in line order followed by functions.
    pub fn into_details(self) -> Vec<CoverageDetail> {
        if !self.unattached.is_empty() {
            debug!(
                path = %self.path,
                lines = self.unattached.len(),
                "dropping branch arms on lines without a line record"
            );
        }
        self.statements
            .into_values()
            .map(CoverageDetail::Statement)
            .chain(self.functions.into_iter().map(CoverageDetail::Function))
            .collect()
    }
}

/// Every format parser implements this trait.
pub trait Parser {
    fn parse(&self, input: &[u8]) -> Result<Vec<ParsedFile>>;
}

pub fn parse_with_format(format: Format, content: &[u8]) -> Result<Vec<ParsedFile>> {
    match format {
        Format::Cobertura => cobertura::CoberturaParser.parse(content),
        Format::Lcov => lcov::LcovParser.parse(content),
    }
}
