//! Command handler functions for the covtree CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::DisplayConfig;
use crate::display::{
    display_percent, summaries, visible_rows, CoverageClass, MarkdownFormatter,
    PresentationData, RenderOptions, TextFormatter, TreeFormatter,
};
use crate::metric::select_percent;
use crate::model::{CoverageCounts, CoverageDetail};
use crate::node::CoverageNode;
use crate::session::CoverageSession;
use crate::uri::ResourceUri;

/// Output style for the `tree` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson {
    uri: String,
    depth: usize,
    leaf: bool,
    counts: CoverageCounts,
    presentation: PresentationData,
    class: CoverageClass,
    summaries: Vec<String>,
}

fn node_json(node: &CoverageNode, depth: usize, options: &RenderOptions) -> NodeJson {
    let presentation = PresentationData::new(node.counts(), options.metric);
    NodeJson {
        uri: node.uri().to_string(),
        depth,
        leaf: node.is_leaf(),
        counts: *node.counts(),
        class: options.thresholds.classify(presentation.overall_percent),
        presentation,
        summaries: summaries(node.counts()),
    }
}

pub async fn cmd_tree(
    session: &CoverageSession,
    options: &RenderOptions,
    style: Style,
    token: &CancellationToken,
) -> Result<String> {
    let tree = session
        .all_files(token)
        .await
        .context("Failed to load coverage")?;
    let out = match style {
        Style::Text => TextFormatter.format(&tree, options),
        Style::Markdown => MarkdownFormatter.format(&tree, options),
        Style::Json => {
            let rows: Vec<NodeJson> = visible_rows(&tree, options.max_depth)
                .into_iter()
                .map(|row| node_json(row.node, row.depth, options))
                .collect();
            let mut json = serde_json::to_string_pretty(&rows)?;
            json.push('\n');
            json
        }
    };
    Ok(out)
}

pub async fn cmd_summary(
    session: &CoverageSession,
    config: &DisplayConfig,
    token: &CancellationToken,
) -> Result<String> {
    let tree = session
        .all_files(token)
        .await
        .context("Failed to load coverage")?;
    let totals = tree.totals();
    let percent = select_percent(&totals, config.metric);

    let mut out = String::new();
    writeln!(out, "Files:      {}", tree.file_count()).unwrap();
    writeln!(
        out,
        "Coverage:   {} ({}, {})",
        display_percent(percent),
        config.metric,
        config.thresholds.classify(percent).as_str()
    )
    .unwrap();
    for line in summaries(&totals) {
        writeln!(out, "  {line}").unwrap();
    }
    Ok(out)
}

pub async fn cmd_file(
    session: &CoverageSession,
    path: &str,
    config: &DisplayConfig,
    token: &CancellationToken,
) -> Result<String> {
    let uri: ResourceUri = path.parse()?;
    let Some(node) = session
        .get_uri(&uri, token)
        .await
        .context("Failed to load coverage")?
    else {
        return Ok(format!("No coverage data for '{path}'\n"));
    };

    let percent = select_percent(node.counts(), config.metric);
    let mut out = String::new();
    writeln!(out, "{}", node.uri()).unwrap();
    writeln!(
        out,
        "Coverage ({}): {} [{}]",
        config.metric,
        display_percent(percent),
        config.thresholds.classify(percent).as_str()
    )
    .unwrap();
    for line in summaries(node.counts()) {
        writeln!(out, "  {line}").unwrap();
    }

    match node.as_leaf() {
        Some(leaf) => {
            let details = leaf
                .details(token)
                .await
                .with_context(|| format!("Failed to resolve details for '{path}'"))?;
            out.push('\n');
            out.push_str(&format_details(&details));
        }
        None => {
            out.push('\n');
            let tree = session.all_files(token).await?;
            for child in tree.children(Some(&uri)) {
                let child_percent = select_percent(child.counts(), config.metric);
                let marker = if child.is_leaf() { "" } else { "/" };
                writeln!(
                    out,
                    "  {:<48} {:>8}",
                    format!("{}{marker}", child.uri().label()),
                    display_percent(child_percent)
                )
                .unwrap();
            }
        }
    }
    Ok(out)
}

fn format_details(details: &[CoverageDetail]) -> String {
    let mut out = String::new();
    let mut uncovered = Vec::new();

    writeln!(out, "{:>6}  {:>10}  {:>8}", "LINE", "HITS", "BRANCHES").unwrap();
    writeln!(out, "{}", "-".repeat(30)).unwrap();
    for detail in details {
        let CoverageDetail::Statement(stmt) = detail else {
            continue;
        };
        if stmt.hits == 0 {
            uncovered.push(stmt.line);
        }
        let branches = if stmt.branches.is_empty() {
            String::new()
        } else {
            format!("{}/{}", stmt.branches_taken(), stmt.branches.len())
        };
        let marker = if stmt.hits > 0 { "✓" } else { "✗" };
        writeln!(
            out,
            "{:>6}  {:>10}  {:>8}  {marker}",
            stmt.line, stmt.hits, branches
        )
        .unwrap();
    }

    let functions: Vec<_> = details
        .iter()
        .filter_map(|d| match d {
            CoverageDetail::Function(func) => Some(func),
            CoverageDetail::Statement(_) => None,
        })
        .collect();
    if !functions.is_empty() {
        out.push_str("\nFunctions:\n");
        for func in functions {
            let line = func.line.map(|l| format!(":{l}")).unwrap_or_default();
            writeln!(out, "  {}{line}  {} hits", func.name, func.hits).unwrap();
        }
    }

    if uncovered.is_empty() {
        out.push_str("\nAll instrumentable lines are covered.\n");
    } else {
        uncovered.sort_unstable();
        writeln!(
            out,
            "\nUncovered lines: {} ({} lines)",
            format_line_ranges(&uncovered),
            uncovered.len()
        )
        .unwrap();
    }
    out
}

/// Compact range notation for sorted line numbers, e.g. "1, 3-5, 8".
#[must_use]
pub fn format_line_ranges(lines: &[u32]) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some((_, end)) if line == *end + 1 => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
