//! Error taxonomy for script execution.
//!
//! [`ScriptError`] describes what went wrong with a single record. The
//! interpreter wraps it in a [`RowError`] that carries the source line and the
//! operation kind, which is the only error artifact a run produces.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{Column, OperationKind, Value};

/// Expected state of a column, as reported by semantic validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnState {
    /// The column must hold the sentinel.
    Absent,
    /// The column must hold a value.
    Present,
}

impl std::fmt::Display for ColumnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnState::Absent => f.write_str("NULL"),
            ColumnState::Present => f.write_str("a value"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    // Schema: row shape and column syntax.
    #[error("row has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("column \"{column}\" has invalid value \"{value}\": {expected}")]
    ColumnSyntax {
        column: Column,
        value: String,
        expected: String,
    },

    // Semantic: per-kind column requirements.
    #[error("{row} row: column \"{column}\" must be {expected}")]
    ColumnState {
        row: &'static str,
        column: Column,
        expected: ColumnState,
    },

    // Expansion.
    #[error("unresolved variable reference {token}")]
    UnresolvedReference { token: String },

    #[error("variable {name} resolves to an empty value")]
    EmptyValue { name: String },

    // Execution.
    #[error("command `{command}` exited with status {actual}, expected {expected}")]
    UnexpectedExitCode {
        command: String,
        actual: i32,
        expected: i32,
    },

    #[error("could not run command `{command}`: {err}")]
    CommandIo { command: String, err: io::Error },

    #[error("invalid result filter `{filter}`: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("result filter `{filter}` does not match output \"{output}\"")]
    FilterMatch { filter: String, output: String },

    #[error("cannot convert \"{value}\" to {target}")]
    Coercion { value: String, target: &'static str },

    #[error("failed to evaluate `{expression}`: {reason}")]
    StatementEvaluation { expression: String, reason: String },

    #[error("value {actual} does not match expected {expected}")]
    AssertionMismatch { expected: Value, actual: Value },

    #[error("cannot set environment variable {name}: {reason}")]
    EnvironmentWrite { name: String, reason: String },

    // Copy.
    #[error("copy expects `SOURCE DESTINATION`, got `{expression}`")]
    CopyArguments { expression: String },

    #[error("copy source {} does not exist", .path.display())]
    SourceMissing { path: PathBuf },

    #[error("cannot copy directory {} onto existing file {}", .source_path.display(), .destination.display())]
    DirectoryOntoFile {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("{} and {} are the same file", .source_path.display(), .destination.display())]
    SameFile {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("failed to copy {} to {}: {}", .source_path.display(), .destination.display(), .err)]
    CopyIo {
        source_path: PathBuf,
        destination: PathBuf,
        err: io::Error,
    },
}

/// A [`ScriptError`] located at a script line.
///
/// The display form already includes the inner error, so it is not exposed as
/// a `source()` and `{:#}` chains print it once.
#[derive(Debug, Error)]
#[error("line {line}{}: {error}", describe(.kind))]
pub struct RowError {
    pub line: u64,
    /// `None` when the kind column itself is not a known operation.
    pub kind: Option<OperationKind>,
    pub error: ScriptError,
}

impl RowError {
    pub fn new(line: u64, kind: Option<OperationKind>, error: ScriptError) -> Self {
        Self { line, kind, error }
    }
}

fn describe(kind: &Option<OperationKind>) -> String {
    match kind {
        Some(kind) => format!(" ({}, {} row)", kind, kind.description()),
        None => String::new(),
    }
}
