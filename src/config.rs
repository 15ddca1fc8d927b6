//! Display configuration, read from an optional JSON file.
//!
//! ```json
//! { "metric": "minimum", "thresholds": { "good": 0.95, "warning": 0.75 } }
//! ```
//!
//! Missing fields fall back to their defaults.

use std::path::Path;

use serde::Deserialize;

use crate::display::{RenderOptions, Thresholds};
use crate::error::{CovtreeError, Result};
use crate::metric::MetricMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DisplayConfig {
    pub metric: MetricMode,
    pub thresholds: Thresholds,
}

impl DisplayConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: DisplayConfig = serde_json::from_str(text)
            .map_err(|e| CovtreeError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            CovtreeError::Config(msg) => CovtreeError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let Thresholds { good, warning } = self.thresholds;
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(good) || !in_range(warning) {
            return Err(CovtreeError::Config(
                "thresholds must be fractions between 0 and 1".to_string(),
            ));
        }
        if warning > good {
            return Err(CovtreeError::Config(format!(
                "warning threshold ({warning}) is above the good threshold ({good})"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn render_options(&self, max_depth: Option<usize>) -> RenderOptions {
        RenderOptions {
            metric: self.metric,
            thresholds: self.thresholds,
            max_depth,
        }
    }
}
