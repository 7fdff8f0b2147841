//! Error types for the layer pipeline.
//!
//! Only `ConfigurationError` rejects a request outright. Everything else is
//! recoverable and scoped to one layer of one file.

use thiserror::Error;

/// A request that cannot be executed as given.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid layer id {0}: expected an integer between 1 and 6")]
    InvalidLayerId(i64),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Source for {file_path} is {size} bytes, above the {limit} byte limit")]
    SourceTooLarge {
        file_path: String,
        size: usize,
        limit: usize,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// The source could not be parsed into an AST.
///
/// Recoverable: the text layers still run and the AST layers are disabled for
/// the rest of the file's run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse {file_path}: {}", messages.join("; "))]
pub struct ParseError {
    pub file_path: String,
    pub messages: Vec<String>,
}

impl ParseError {
    /// Callers should fall back to the regex rules for this file.
    pub fn fallback_to_regex(&self) -> bool {
        true
    }
}

/// A set of span edits that cannot be applied to its source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("Edit {start}..{end} overlaps an earlier edit ending at {previous_end}")]
    Overlap {
        start: u32,
        end: u32,
        previous_end: u32,
    },

    #[error("Edit {start}..{end} is outside a source of {len} bytes")]
    OutOfBounds { start: u32, end: u32, len: usize },

    #[error("Edit boundary {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: u32 },
}

/// A single layer failed to produce output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerExecutionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Code generation failed: {0}")]
    Generation(#[from] GenError),

    #[error("Pass {pass} produced source that no longer parses")]
    InvalidIntermediate { pass: String },

    #[error("Layer panicked: {0}")]
    Panicked(String),
}

impl LayerExecutionError {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, LayerExecutionError::Parse(_))
    }
}

/// A history or notification sink rejected a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sink {sink} failed: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}
