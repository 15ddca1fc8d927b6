//! Auto-detection of coverage report formats.
//!
//! The file extension is checked first, then the first few KB of content.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::CovtreeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Cobertura,
    Lcov,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Cobertura => "cobertura",
            Format::Lcov => "lcov",
        }
    }
}

impl FromStr for Format {
    type Err = CovtreeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cobertura" => Ok(Format::Cobertura),
            "lcov" => Ok(Format::Lcov),
            _ => Err(CovtreeError::Parse(format!(
                "Unknown format: '{s}'. Supported: cobertura, lcov"
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn detect_format(path: &Path, content: &[u8]) -> Option<Format> {
    detect_by_extension(path).or_else(|| detect_by_content(content))
}

fn detect_by_extension(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "info" | "lcov" => Some(Format::Lcov),
        _ => None,
    }
}

fn detect_by_content(content: &[u8]) -> Option<Format> {
    let head = String::from_utf8_lossy(&content[..content.len().min(4096)]);

    // Tags must start a line; a mention elsewhere is not enough.
    let has_sf = head.lines().any(|l| l.starts_with("SF:"));
    let has_records = head
        .lines()
        .any(|l| l.starts_with("DA:") || l.starts_with("FN:") || l.starts_with("BRDA:"));
    if has_sf && has_records {
        return Some(Format::Lcov);
    }

    let trimmed = head.trim_start();
    if (trimmed.starts_with("<?xml") || trimmed.starts_with('<')) && head.contains("<coverage") {
        return Some(Format::Cobertura);
    }

    None
}
