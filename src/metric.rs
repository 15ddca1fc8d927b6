//! Choosing the single percentage shown for a node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::CovtreeError;
use crate::model::CoverageCounts;

/// Which scalar to surface for a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum MetricMode {
    /// Statement coverage only.
    Statement,
    /// The weakest of statement, branch and function coverage.
    Minimum,
    /// Covered units over total units across every present category.
    #[default]
    #[serde(alias = "total-coverage")]
    #[value(alias = "totalCoverage")]
    TotalCoverage,
}

impl MetricMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricMode::Statement => "statement",
            MetricMode::Minimum => "minimum",
            MetricMode::TotalCoverage => "totalCoverage",
        }
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricMode {
    type Err = CovtreeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "statement" => Ok(MetricMode::Statement),
            "minimum" => Ok(MetricMode::Minimum),
            "totalcoverage" => Ok(MetricMode::TotalCoverage),
            _ => Err(CovtreeError::Config(format!(
                "Unknown metric '{s}'. Supported: statement, minimum, totalCoverage"
            ))),
        }
    }
}

/// The percentage to display for `counts` under `mode`.
#[must_use]
pub fn select_percent(counts: &CoverageCounts, mode: MetricMode) -> f64 {
    match mode {
        MetricMode::Statement => counts.statement.percent(),
        MetricMode::Minimum => counts
            .branch
            .iter()
            .chain(counts.function.iter())
            .map(|c| c.percent())
            .fold(counts.statement.percent(), f64::min),
        MetricMode::TotalCoverage => counts.total_percent(),
    }
}

/// The live metric mode. Observers subscribe to be told when it changes so
/// they can re-render; the coverage tree itself is untouched.
#[derive(Debug)]
pub struct MetricSetting {
    tx: watch::Sender<MetricMode>,
}

impl MetricSetting {
    pub fn new(mode: MetricMode) -> Self {
        let (tx, _) = watch::channel(mode);
        Self { tx }
    }

    #[must_use]
    pub fn get(&self) -> MetricMode {
        *self.tx.borrow()
    }

    /// Update the mode. Subscribers are notified only if it changed.
    /// Returns whether it changed.
    pub fn set(&self, mode: MetricMode) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
        if changed {
            debug!(%mode, "metric mode changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricMode> {
        self.tx.subscribe()
    }
}

impl Default for MetricSetting {
    fn default() -> Self {
        Self::new(MetricMode::default())
    }
}
