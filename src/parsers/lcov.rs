//! Parser for the LCOV `.info` format.
//!
//! Records read:
//!
//! ```text
//!   SF:<source file>
//!   DA:<line>,<hits>[,<checksum>]
//!   BRDA:<line>,<block>,<branch>,<taken>   ("-" means never evaluated)
//!   FN:<line>,<function name>
//!   FNDA:<hits>,<function name>
//!   end_of_record
//! ```
//!
//! Summary records (LF, LH, BRF, BRH, FNF, FNH) are ignored; counts are
//! derived from the detail records.
use std::collections::HashMap;

use super::{ParsedFile, Parser};
use crate::error::{CovtreeError, Result};

pub struct LcovParser;

impl Parser for LcovParser {
    fn parse(&self, input: &[u8]) -> Result<Vec<ParsedFile>> {
        parse(input)
    }
}

pub fn parse(input: &[u8]) -> Result<Vec<ParsedFile>> {
    let text = std::str::from_utf8(input)
        .map_err(|e| CovtreeError::Parse(format!("Invalid UTF-8 in LCOV data: {e}")))?;

    let mut files = Vec::new();
    let mut current: Option<ParsedFile> = None;
    // FN gives the start line, FNDA the hit count; joined by name.
    let mut fn_lines: HashMap<String, u32> = HashMap::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line == "end_of_record" {
            files.extend(current.take());
            fn_lines.clear();
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };

        match tag {
            "SF" => {
                files.extend(current.take());
                fn_lines.clear();
                current = Some(ParsedFile::new(value.to_string()));
            }
            "DA" => {
                let Some(file) = current.as_mut() else { continue };
                let mut parts = value.splitn(3, ',');
                let line_number = parts.next().and_then(|s| s.parse::<u32>().ok());
                let hits = parts.next().and_then(|s| s.parse::<i64>().ok());
                // Negative counts mark non-instrumentable lines.
                if let (Some(line_number), Some(hits)) = (line_number, hits) {
                    if hits >= 0 {
                        file.record_line(line_number, hits as u64);
                    }
                }
            }
            "BRDA" => {
                let Some(file) = current.as_mut() else { continue };
                let parts: Vec<&str> = value.splitn(4, ',').collect();
                if parts.len() != 4 {
                    continue;
                }
                if let Ok(line_number) = parts[0].parse::<u32>() {
                    let hits = parts[3].parse::<u64>().unwrap_or(0);
                    let label = format!("{}.{}", parts[1], parts[2]);
                    file.record_branch(line_number, hits, Some(label));
                }
            }
            "FN" => {
                // Newer lcov writes FN:<start>,<end>,<name>.
                let mut parts = value.split(',');
                let start = parts.next().and_then(|s| s.parse::<u32>().ok());
                if let (Some(start), Some(name)) = (start, parts.last()) {
                    fn_lines.insert(name.to_string(), start);
                }
            }
            "FNDA" => {
                let Some(file) = current.as_mut() else { continue };
                if let Some((hits, name)) = value.split_once(',') {
                    let hits = hits.parse::<u64>().unwrap_or(0);
                    let line_number = fn_lines.get(name).copied();
                    file.record_function(name.to_string(), line_number, hits);
                }
            }
            _ => {}
        }
    }

    files.extend(current.take());
    Ok(files)
}
