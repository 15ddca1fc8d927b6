//! Parser for Cobertura XML coverage reports.
//!
//! ```text
//! <coverage>
//!   <sources><source>/project</source></sources>
//!   <packages><package><classes>
//!     <class filename="src/app.py">
//!       <methods><method name="run"><lines><line number="3" hits="1"/></lines></method></methods>
//!       <lines>
//!         <line number="3" hits="1" branch="true" condition-coverage="50% (1/2)"/>
//!       </lines>
//!     </class>
//!   </classes></package></packages>
//! </coverage>
//! ```
//!
//! Lines can appear both under a `<method>` and under its `<class>`; they are
//! recorded once, keeping the highest hit count.
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;

use super::{ParsedFile, Parser};
use crate::error::{CovtreeError, Result};

/// `condition-coverage="75% (3/4)"` → covered 3 of 4 arms.
static CONDITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)/(\d+)\)").expect("valid regex"));

pub struct CoberturaParser;

impl Parser for CoberturaParser {
    fn parse(&self, input: &[u8]) -> Result<Vec<ParsedFile>> {
        parse(input)
    }
}

struct MethodState {
    name: String,
    first_line: Option<u32>,
    hit: bool,
}

pub fn parse(input: &[u8]) -> Result<Vec<ParsedFile>> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut files = Vec::new();
    let mut buf = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut in_source = false;
    let mut current: Option<ParsedFile> = None;
    let mut method: Option<MethodState> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| CovtreeError::Xml {
            source: Arc::new(e),
            position: reader.buffer_position(),
        })?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                match e.name().as_ref() {
                    // A self-closing <source/> has no text and no end tag.
                    b"source" => in_source = is_start,
                    b"class" => {
                        let attrs = attributes(e);
                        if let Some(filename) = attrs.get("filename") {
                            files.extend(current.take());
                            current = Some(ParsedFile::new(resolve_source_path(
                                filename, &sources,
                            )));
                        }
                    }
                    b"method" => {
                        let attrs = attributes(e);
                        method = attrs.get("name").map(|name| MethodState {
                            name: name.clone(),
                            first_line: None,
                            hit: false,
                        });
                    }
                    b"line" => {
                        if let Some(file) = current.as_mut() {
                            record_line(file, method.as_mut(), &attributes(e));
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                if in_source {
                    let text = e.unescape().map_err(|err| CovtreeError::Xml {
                        source: Arc::new(err),
                        position: reader.buffer_position(),
                    })?;
                    sources.push(text.into_owned());
                    in_source = false;
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"source" => in_source = false,
                b"class" => files.extend(current.take()),
                b"method" => {
                    if let (Some(file), Some(state)) = (current.as_mut(), method.take()) {
                        file.record_function(
                            state.name,
                            state.first_line,
                            u64::from(state.hit),
                        );
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    files.extend(current.take());
    Ok(files)
}

fn record_line(
    file: &mut ParsedFile,
    method: Option<&mut MethodState>,
    attrs: &HashMap<String, String>,
) {
    let Some(line_number) = attrs.get("number").and_then(|n| n.parse::<u32>().ok()) else {
        return;
    };
    let hits = attrs
        .get("hits")
        .and_then(|h| h.parse::<u64>().ok())
        .unwrap_or(0);

    if let Some(method) = method {
        method.first_line.get_or_insert(line_number);
        method.hit |= hits > 0;
    }

    // Branch arms are only known in aggregate: the first `covered` arms are
    // recorded as taken once, the rest as never taken.
    let is_branch = attrs.get("branch").is_some_and(|b| b == "true");
    if is_branch && !file.has_branches(line_number) {
        if let Some(caps) = attrs
            .get("condition-coverage")
            .and_then(|c| CONDITION_RE.captures(c))
        {
            let covered: u32 = caps[1].parse().unwrap_or(0);
            let total: u32 = caps[2].parse().unwrap_or(0);
            for arm in 0..total {
                file.record_branch(line_number, u64::from(arm < covered), None);
            }
        }
    }

    file.record_line(line_number, hits);
}

/// Absolute filenames are kept; relative ones are joined to the first
/// non-empty `<source>`.
fn resolve_source_path(filename: &str, sources: &[String]) -> String {
    if filename.starts_with('/') {
        return filename.to_string();
    }
    sources
        .iter()
        .map(|s| s.trim_end_matches('/'))
        .find(|s| !s.is_empty())
        .map(|base| format!("{base}/{filename}"))
        .unwrap_or_else(|| filename.to_string())
}

fn attributes(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .filter_map(|attr| {
            let attr = attr.ok()?;
            let key = std::str::from_utf8(attr.key.local_name().into_inner())
                .ok()?
                .to_string();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}
