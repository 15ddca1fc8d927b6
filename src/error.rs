use std::sync::Arc;

use thiserror::Error;

/// Errors are shared between every waiter of a pending construction or
/// detail resolution, so the type is `Clone` and wraps foreign errors in `Arc`.
#[derive(Error, Debug, Clone)]
pub enum CovtreeError {
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: Arc<quick_xml::Error>,
        position: usize,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown coverage format")]
    UnknownFormat,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Coverage provider failed: {0}")]
    Provider(String),

    #[error("No coverage file with index {0}")]
    FileIndex(usize),

    #[error("Duplicate coverage record for {0}")]
    DuplicateFile(String),

    #[error("Invalid resource identifier: {0}")]
    InvalidUri(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for CovtreeError {
    fn from(err: std::io::Error) -> Self {
        CovtreeError::Io(Arc::new(err))
    }
}

impl CovtreeError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CovtreeError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CovtreeError>;
