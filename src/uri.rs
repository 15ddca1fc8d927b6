//! Resource identifiers and their decomposition into prefix-tree keys.
//!
//! A URI `scheme://authority/path/to/file` maps to the key
//! `["scheme", "authority", "", "path", "to", "file"]`: scheme, authority,
//! then the path split on `/`. Decoding takes the first two segments as
//! scheme and authority and rejoins the rest with `/`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CovtreeError, Result};

pub const FILE_SCHEME: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceUri {
    pub scheme: String,
    pub authority: String,
    pub path: String,
}

impl ResourceUri {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
        }
    }

    /// A `file` URI for a filesystem path as found in a coverage report.
    /// Backslashes become `/` and relative paths are rooted.
    pub fn file(path: &str) -> Self {
        let mut normalized = path.replace('\\', "/");
        if !normalized.starts_with('/') {
            normalized.insert(0, '/');
        }
        Self::new(FILE_SCHEME, "", normalized)
    }

    /// Prefix-tree key for this identifier.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::with_capacity(2 + self.path.matches('/').count() + 1);
        segments.push(self.scheme.clone());
        segments.push(self.authority.clone());
        if !self.path.is_empty() {
            segments.extend(self.path.split('/').map(str::to_owned));
        }
        segments
    }

    /// Rebuild an identifier from a (possibly partial) prefix-tree key.
    /// Missing authority or path decode as empty strings.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        let (scheme, rest) = segments
            .split_first()
            .ok_or_else(|| CovtreeError::InvalidUri("empty key".to_string()))?;
        let (authority, path) = match rest.split_first() {
            Some((authority, path)) => (authority.as_ref(), path),
            None => ("", &[] as &[S]),
        };
        let path = path
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join("/");
        Ok(Self::new(scheme.as_ref(), authority, path))
    }

    /// Last non-empty path segment, or the authority/scheme for short keys.
    #[must_use]
    pub fn label(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .or_else(|| Some(self.authority.as_str()).filter(|a| !a.is_empty()))
            .unwrap_or(&self.scheme)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)?;
        if !self.path.is_empty() && !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)
    }
}

impl FromStr for ResourceUri {
    type Err = CovtreeError;

    /// Accepts `scheme://authority/path`; anything without `://` is read as
    /// a file path.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let Some((scheme, rest)) = s.split_once("://") else {
            if s.is_empty() {
                return Err(CovtreeError::InvalidUri(s.to_string()));
            }
            return Ok(Self::file(s));
        };
        let valid_scheme = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme {
            return Err(CovtreeError::InvalidUri(s.to_string()));
        }
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        Ok(Self::new(scheme, authority, path))
    }
}
