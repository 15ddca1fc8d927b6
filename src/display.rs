//! What the presentation layer consumes: formatted percentages, coverage
//! classes, per-category summaries, and rendered trees.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::aggregate::CoverageTree;
use crate::metric::{select_percent, MetricMode};
use crate::model::{CoverageCounts, CoveredCount};
use crate::node::CoverageNode;
use crate::tree::NodeRef;

/// Format a fraction as a percentage with two decimals. Incomplete coverage
/// that would round up to `100.00%` is shown as `99.99%`.
#[must_use]
pub fn display_percent(fraction: f64) -> String {
    let text = format!("{:.2}", fraction * 100.0);
    if fraction < 1.0 && text == "100.00" {
        return "99.99%".to_string();
    }
    format!("{text}%")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageClass {
    Good,
    Warning,
    Bad,
}

impl CoverageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageClass::Good => "good",
            CoverageClass::Warning => "warning",
            CoverageClass::Bad => "bad",
        }
    }
}

/// Lower bounds for each class, checked from `good` down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub good: f64,
    pub warning: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            good: 0.9,
            warning: 0.8,
        }
    }
}

impl Thresholds {
    #[must_use]
    pub fn classify(&self, percent: f64) -> CoverageClass {
        if percent >= self.good {
            CoverageClass::Good
        } else if percent >= self.warning {
            CoverageClass::Warning
        } else {
            CoverageClass::Bad
        }
    }
}

/// Per-node numbers handed to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationData {
    pub overall_percent: f64,
    pub statement_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_percent: Option<f64>,
}

impl PresentationData {
    pub fn new(counts: &CoverageCounts, mode: MetricMode) -> Self {
        Self {
            overall_percent: select_percent(counts, mode),
            statement_percent: counts.statement.percent(),
            function_percent: counts.function.map(|c| c.percent()),
            branch_percent: counts.branch.map(|c| c.percent()),
        }
    }
}

/// `"3/4 statements covered (75.00%)"`.
#[must_use]
pub fn summary_line(noun: &str, count: CoveredCount) -> String {
    format!(
        "{}/{} {noun} covered ({})",
        count.covered,
        count.total,
        display_percent(count.percent())
    )
}

/// One summary line per present category.
#[must_use]
pub fn summaries(counts: &CoverageCounts) -> Vec<String> {
    let mut lines = vec![summary_line("statements", counts.statement)];
    if let Some(branch) = counts.branch {
        lines.push(summary_line("branches", branch));
    }
    if let Some(function) = counts.function {
        lines.push(summary_line("functions", function));
    }
    lines
}

/// Rendering options shared by every formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub metric: MetricMode,
    pub thresholds: Thresholds,
    pub max_depth: Option<usize>,
}

pub trait TreeFormatter {
    fn format(&self, tree: &CoverageTree, options: &RenderOptions) -> String;
}

/// A tree position as shown to users. The empty-authority and leading-`/`
/// positions of `file` URIs are skipped so that directories hang directly
/// under their scheme.
pub struct Row<'a> {
    pub depth: usize,
    pub label: String,
    pub node: &'a CoverageNode,
}

pub fn visible_rows<'a>(tree: &'a CoverageTree, max_depth: Option<usize>) -> Vec<Row<'a>> {
    tree.nodes()
        .filter_map(|position| row(&position))
        .filter(|row| max_depth.map_or(true, |max| row.depth <= max))
        .collect()
}

fn row<'a>(position: &NodeRef<'a, std::sync::Arc<CoverageNode>>) -> Option<Row<'a>> {
    let path = position.path();
    let node = position.value()?;
    let (scheme, rest) = path.split_first()?;
    if rest.last().is_some_and(|s| s.is_empty()) {
        return None;
    }
    let depth = rest.iter().filter(|s| !s.is_empty()).count();
    let label = match rest.last() {
        Some(last) => (*last).to_string(),
        None => format!("{scheme}://"),
    };
    Some(Row {
        depth,
        label,
        node: node.as_ref(),
    })
}

fn category_cell(count: Option<CoveredCount>) -> String {
    match count {
        Some(c) => format!("{}/{}", c.covered, c.total),
        None => "-".to_string(),
    }
}

/// Indented plain-text tree.
pub struct TextFormatter;

impl TreeFormatter for TextFormatter {
    fn format(&self, tree: &CoverageTree, options: &RenderOptions) -> String {
        let mut out = String::new();
        if tree.is_empty() {
            out.push_str("No coverage data.\n");
            return out;
        }

        writeln!(
            out,
            "{:<50} {:>8}  {:<7}  {:>10} {:>10} {:>10}",
            "PATH", "COVERAGE", "CLASS", "STMTS", "BRANCHES", "FUNCS"
        )
        .unwrap();
        writeln!(out, "{}", "-".repeat(102)).unwrap();

        for row in visible_rows(tree, options.max_depth) {
            let percent = select_percent(row.node.counts(), options.metric);
            let name = format!("{}{}", "  ".repeat(row.depth), row.label);
            writeln!(
                out,
                "{:<50} {:>8}  {:<7}  {:>10} {:>10} {:>10}",
                name,
                display_percent(percent),
                options.thresholds.classify(percent).as_str(),
                category_cell(Some(row.node.statement())),
                category_cell(row.node.branch()),
                category_cell(row.node.function()),
            )
            .unwrap();
        }

        let totals = tree.totals();
        let percent = select_percent(&totals, options.metric);
        writeln!(out, "\nTotal ({}): {}", options.metric, display_percent(percent)).unwrap();
        out
    }
}

/// Markdown table, one row per file.
pub struct MarkdownFormatter;

impl TreeFormatter for MarkdownFormatter {
    fn format(&self, tree: &CoverageTree, options: &RenderOptions) -> String {
        let mut md = String::new();
        let totals = tree.totals();
        let total_percent = select_percent(&totals, options.metric);
        writeln!(md, "### Coverage: {}\n", display_percent(total_percent)).unwrap();

        if tree.is_empty() {
            md.push_str("No coverage data.\n");
            return md;
        }

        md.push_str("| File | Coverage | Statements | Branches | Functions |\n");
        md.push_str("|:-----|---------:|-----------:|---------:|----------:|\n");
        for leaf in tree.leaves() {
            let counts = leaf.counts();
            let percent = select_percent(counts, options.metric);
            writeln!(
                md,
                "| `{}` | {} | {} | {} | {} |",
                leaf.uri().path,
                display_percent(percent),
                category_cell(Some(counts.statement)),
                category_cell(counts.branch),
                category_cell(counts.function),
            )
            .unwrap();
        }

        md.push('\n');
        for line in summaries(&totals) {
            writeln!(md, "- {line}").unwrap();
        }
        md
    }
}
