//! Shared types for the record model and the variable store.
//!
//! These are plain data with no I/O; the schema validator produces them and
//! every handler consumes them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation declared by a record's first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Const,
    Env,
    Run,
    Message,
    Statement,
    Copy,
}

impl OperationKind {
    /// Parse the kind column. `CMD` is accepted as the older name of `RUN`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "CONST" => Some(Self::Const),
            "ENV" => Some(Self::Env),
            "RUN" | "CMD" => Some(Self::Run),
            "MESSAGE" => Some(Self::Message),
            "STATEMENT" => Some(Self::Statement),
            "COPY" => Some(Self::Copy),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Const => "CONST",
            Self::Env => "ENV",
            Self::Run => "RUN",
            Self::Message => "MESSAGE",
            Self::Statement => "STATEMENT",
            Self::Copy => "COPY",
        }
    }

    /// Human-readable row description used in diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            Self::Const => "constant",
            Self::Env => "environment variable",
            Self::Run => "command",
            Self::Message => "message",
            Self::Statement => "statement",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Declared type of a stored or expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    None,
    Integer,
    String,
}

impl ValueType {
    /// Parse the value-type column (`NULL`, `INT`, `STR`).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "NULL" => Some(Self::None),
            "INT" => Some(Self::Integer),
            "STR" => Some(Self::String),
            _ => None,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "NULL",
            Self::Integer => "INT",
            Self::String => "STR",
        }
    }
}

/// A value held by the transient store or produced by an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Str(s) if s.is_empty())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
        }
    }

    /// Truthiness used by logical operators: non-zero integer, non-empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Fixed column layout of a script row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Kind,
    Expression,
    ExitCode,
    ValueType,
    Value,
    Filter,
    OutputVar,
    Message,
}

impl Column {
    /// Columns in file order.
    pub const ALL: [Column; 8] = [
        Column::Kind,
        Column::Expression,
        Column::ExitCode,
        Column::ValueType,
        Column::Value,
        Column::Filter,
        Column::OutputVar,
        Column::Message,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn label(self) -> &'static str {
        match self {
            Column::Kind => "kind",
            Column::Expression => "expression",
            Column::ExitCode => "expected exit code",
            Column::ValueType => "value type",
            Column::Value => "value",
            Column::Filter => "result filter",
            Column::OutputVar => "output variable",
            Column::Message => "message",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_is_an_alias_for_run() {
        assert_eq!(OperationKind::parse("CMD"), Some(OperationKind::Run));
        assert_eq!(OperationKind::parse("RUN"), Some(OperationKind::Run));
        assert_eq!(OperationKind::parse("run"), None);
    }

    #[test]
    fn value_serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::Int(3), Value::from("x")]).expect("json");
        assert_eq!(json, r#"[3,"x"]"#);
    }
}
