//! Row schema validation.
//!
//! A raw row goes through three checks before it becomes a [`Record`]:
//!
//! 1. column count matches the fixed layout;
//! 2. each column satisfies its syntax rule (identifier shape, digits, enum
//!    membership, sentinel-or-non-empty);
//! 3. the columns a given operation kind needs are present, and the ones it
//!    does not use hold the sentinel.
//!
//! The sentinel is converted to `None` here and never travels further.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::record::Record;
use crate::core::types::{Column, OperationKind, ValueType};
use crate::error::{ColumnState, ScriptError};

/// Default token marking an intentionally absent column.
pub const DEFAULT_SENTINEL: &str = "NULL";

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").unwrap());

/// True if `value` is a valid variable name.
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Compile a result filter, anchored at the start of the output.
///
/// The filter must contain exactly one capture group; its text is returned as
/// the captured value.
pub fn compile_filter(filter: &str) -> Result<Regex, String> {
    let regex = Regex::new(&format!("^(?:{filter})")).map_err(|err| err.to_string())?;
    let groups = regex.captures_len() - 1;
    if groups != 1 {
        return Err(format!("expected exactly one capture group, found {groups}"));
    }
    Ok(regex)
}

/// Validate a raw row and build the typed record.
pub fn validate_and_build<S: AsRef<str>>(
    line: u64,
    row: &[S],
    sentinel: &str,
) -> Result<Record, ScriptError> {
    if row.len() != Column::COUNT {
        return Err(ScriptError::ColumnCount {
            expected: Column::COUNT,
            actual: row.len(),
        });
    }
    let cell = |column: Column| row[column as usize].as_ref();
    let columns = Columns { sentinel };

    let kind = columns.kind(cell(Column::Kind))?;
    let record = Record {
        line,
        kind,
        expression: columns.text(Column::Expression, cell(Column::Expression))?,
        expected_exit_code: columns.exit_code(cell(Column::ExitCode))?,
        value_type: columns.value_type(cell(Column::ValueType))?,
        value: columns.text(Column::Value, cell(Column::Value))?,
        filter: columns.filter(cell(Column::Filter))?,
        output_var: columns.output_var(cell(Column::OutputVar))?,
        message: columns.message(cell(Column::Message))?,
    };

    validate_semantics(&record, sentinel)?;
    Ok(record)
}

/// Operation kind named by a raw row, if its first column parses.
///
/// Lets a row that fails validation still be reported with its kind.
pub fn row_kind<S: AsRef<str>>(row: &[S]) -> Option<OperationKind> {
    row.first().and_then(|cell| OperationKind::parse(cell.as_ref()))
}

/// Column-level syntax rules.
struct Columns<'a> {
    sentinel: &'a str,
}

impl Columns<'_> {
    fn absent(&self, value: &str) -> bool {
        value == self.sentinel
    }

    fn kind(&self, value: &str) -> Result<OperationKind, ScriptError> {
        OperationKind::parse(value).ok_or_else(|| {
            syntax(
                Column::Kind,
                value,
                "expected one of CONST, ENV, RUN, MESSAGE, STATEMENT, COPY",
            )
        })
    }

    fn text(&self, column: Column, value: &str) -> Result<Option<String>, ScriptError> {
        if value.is_empty() {
            return Err(syntax(column, value, "expected NULL or a non-empty string"));
        }
        if self.absent(value) {
            return Ok(None);
        }
        Ok(Some(value.to_string()))
    }

    fn exit_code(&self, value: &str) -> Result<Option<i32>, ScriptError> {
        if self.absent(value) {
            return Ok(None);
        }
        let invalid = || syntax(Column::ExitCode, value, "expected NULL or a non-negative integer");
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        value.parse::<i32>().map(Some).map_err(|_| invalid())
    }

    fn value_type(&self, value: &str) -> Result<ValueType, ScriptError> {
        if self.absent(value) {
            return Ok(ValueType::None);
        }
        ValueType::parse(value)
            .ok_or_else(|| syntax(Column::ValueType, value, "expected one of NULL, INT, STR"))
    }

    fn filter(&self, value: &str) -> Result<Option<String>, ScriptError> {
        let filter = self.text(Column::Filter, value)?;
        if let Some(filter) = &filter
            && !filter.contains("${")
        {
            compile_filter(filter).map_err(|reason| syntax(Column::Filter, filter, &reason))?;
        }
        Ok(filter)
    }

    fn output_var(&self, value: &str) -> Result<Option<String>, ScriptError> {
        if self.absent(value) {
            return Ok(None);
        }
        if !is_identifier(value) {
            return Err(syntax(
                Column::OutputVar,
                value,
                "expected NULL or letters, digits and underscores",
            ));
        }
        Ok(Some(value.to_string()))
    }

    fn message(&self, value: &str) -> Result<String, ScriptError> {
        if value.is_empty() {
            return Err(syntax(Column::Message, value, "expected a non-empty string"));
        }
        Ok(value.to_string())
    }
}

fn syntax(column: Column, value: &str, expected: &str) -> ScriptError {
    ScriptError::ColumnSyntax {
        column,
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Per-kind column requirements.
fn validate_semantics(record: &Record, sentinel: &str) -> Result<(), ScriptError> {
    let rules = Rules {
        row: record.kind.description(),
    };
    let expression = record.expression.is_some();
    let exit_code = record.expected_exit_code.is_some();
    let value_type = !record.value_type.is_none();
    let value = record.value.is_some();
    let filter = record.filter.is_some();
    let output_var = record.output_var.is_some();

    match record.kind {
        OperationKind::Const => {
            rules.absent(Column::Expression, expression)?;
            rules.absent(Column::ExitCode, exit_code)?;
            rules.present(Column::ValueType, value_type)?;
            rules.present(Column::Value, value)?;
            rules.absent(Column::Filter, filter)?;
            rules.present(Column::OutputVar, output_var)?;
        }
        OperationKind::Message => {
            rules.absent(Column::Expression, expression)?;
            rules.absent(Column::ExitCode, exit_code)?;
            rules.absent(Column::ValueType, value_type)?;
            rules.absent(Column::Value, value)?;
            rules.absent(Column::Filter, filter)?;
            rules.absent(Column::OutputVar, output_var)?;
        }
        OperationKind::Env => {
            rules.absent(Column::Expression, expression)?;
            rules.absent(Column::ExitCode, exit_code)?;
            rules.absent(Column::ValueType, value_type)?;
            rules.present(Column::Value, value)?;
            rules.absent(Column::Filter, filter)?;
            rules.present(Column::OutputVar, output_var)?;
        }
        OperationKind::Run => {
            rules.present(Column::Expression, expression)?;
            rules.present(Column::ExitCode, exit_code)?;
            rules.absent(Column::Value, value)?;
            if filter {
                rules.present(Column::OutputVar, output_var)?;
                rules.present(Column::ValueType, value_type)?;
            }
            if output_var {
                rules.present(Column::ValueType, value_type)?;
            }
        }
        OperationKind::Statement => {
            rules.present(Column::Expression, expression)?;
            rules.absent(Column::ExitCode, exit_code)?;
            rules.absent(Column::Filter, filter)?;
        }
        OperationKind::Copy => {
            rules.present(Column::Expression, expression)?;
            rules.absent(Column::ExitCode, exit_code)?;
            rules.absent(Column::Value, value)?;
            rules.absent(Column::Filter, filter)?;
            rules.absent(Column::OutputVar, output_var)?;
            if let Some(expression) = &record.expression {
                split_copy_paths(expression)?;
            }
        }
    }

    rules.present(Column::Message, record.message != sentinel)
}

struct Rules {
    row: &'static str,
}

impl Rules {
    fn absent(&self, column: Column, is_set: bool) -> Result<(), ScriptError> {
        self.expect(column, !is_set, ColumnState::Absent)
    }

    fn present(&self, column: Column, is_set: bool) -> Result<(), ScriptError> {
        self.expect(column, is_set, ColumnState::Present)
    }

    fn expect(&self, column: Column, ok: bool, expected: ColumnState) -> Result<(), ScriptError> {
        if ok {
            return Ok(());
        }
        Err(ScriptError::ColumnState {
            row: self.row,
            column,
            expected,
        })
    }
}

/// Split a COPY expression into source and destination.
///
/// Paths are separated by a single space; anything other than exactly two
/// non-empty parts is rejected.
pub fn split_copy_paths(expression: &str) -> Result<(&str, &str), ScriptError> {
    let mut parts = expression.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(source), Some(destination), None) if !source.is_empty() && !destination.is_empty() => {
            Ok((source, destination))
        }
        _ => Err(ScriptError::CopyArguments {
            expression: expression.to_string(),
        }),
    }
}
