//! Validated, typed representation of one script row.

use crate::core::types::{Column, OperationKind, ValueType};
use crate::error::{ColumnState, ScriptError};

/// One validated row. Absent columns are `None`; the sentinel token never
/// reaches this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line in the source file.
    pub line: u64,
    pub kind: OperationKind,
    pub expression: Option<String>,
    pub expected_exit_code: Option<i32>,
    pub value_type: ValueType,
    /// Default value (CONST, ENV) or expected value (STATEMENT).
    pub value: Option<String>,
    pub filter: Option<String>,
    pub output_var: Option<String>,
    pub message: String,
}

impl Record {
    /// Borrow a column the validator guarantees for this kind.
    ///
    /// Returns the same semantic error the validator would have produced, so a
    /// hand-built record that skips validation still fails cleanly.
    pub fn required<'a>(
        &self,
        field: &'a Option<String>,
        column: Column,
    ) -> Result<&'a str, ScriptError> {
        field.as_deref().ok_or(ScriptError::ColumnState {
            row: self.kind.description(),
            column,
            expected: ColumnState::Present,
        })
    }

    pub fn expression(&self) -> Result<&str, ScriptError> {
        self.required(&self.expression, Column::Expression)
    }

    pub fn expected_exit_code(&self) -> Result<i32, ScriptError> {
        self.expected_exit_code.ok_or(ScriptError::ColumnState {
            row: self.kind.description(),
            column: Column::ExitCode,
            expected: ColumnState::Present,
        })
    }
}
