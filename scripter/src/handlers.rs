//! Per-kind record handlers.
//!
//! Every handler expands the record's message first and returns it, so the
//! interpreter can report the row whether or not it had a side effect.

use std::path::Path;

use tracing::debug;

use crate::core::expand::{expand, expand_opt};
use crate::core::expr::{evaluate, to_int};
use crate::core::record::Record;
use crate::core::schema::{compile_filter, split_copy_paths};
use crate::core::types::{Column, Value, ValueType};
use crate::core::vars::Variables;
use crate::error::ScriptError;
use crate::io::command::CommandRunner;
use crate::io::copy::copy_path;

/// State a handler may read or change.
pub struct ExecContext<'a> {
    pub vars: &'a mut Variables,
    pub runner: &'a dyn CommandRunner,
}

/// CONST: store the expanded value in the transient store.
pub fn handle_const(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    let message = expand(&record.message, ctx.vars)?;
    let name = record.required(&record.output_var, Column::OutputVar)?;
    let raw = expand(record.required(&record.value, Column::Value)?, ctx.vars)?;
    let value = coerce(&raw, record.value_type)?;
    debug!(name, value = %value, "define constant");
    ctx.vars.set(name, value)?;
    Ok(message)
}

/// ENV: write the expanded value to the environment layer.
pub fn handle_env(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    let message = expand(&record.message, ctx.vars)?;
    let name = record.required(&record.output_var, Column::OutputVar)?;
    let value = expand(record.required(&record.value, Column::Value)?, ctx.vars)?;
    debug!(name, value = %value, "set environment variable");
    ctx.vars.env_mut().set(name, &value)?;
    Ok(message)
}

/// MESSAGE: nothing beyond the message itself.
pub fn handle_message(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    expand(&record.message, ctx.vars)
}

/// RUN: run the command, check its exit code, optionally capture output.
pub fn handle_run(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    let message = expand(&record.message, ctx.vars)?;
    let command = expand(record.expression()?, ctx.vars)?;
    let expected = record.expected_exit_code()?;
    let filter = expand_opt(record.filter.as_deref(), ctx.vars)?;
    debug!(command = %command, expected, filter = ?filter, "run command");

    let exported: Vec<(&str, &str)> = ctx.vars.env().exported().collect();
    let out = ctx.runner.run(&command, &exported)?;
    if out.exit_code != expected {
        return Err(ScriptError::UnexpectedExitCode {
            command,
            actual: out.exit_code,
            expected,
        });
    }

    let captured = match &filter {
        Some(filter) => Some(apply_filter(filter, &out.output)?),
        None => None,
    };
    if let Some(name) = record.output_var.as_deref() {
        let value = match captured {
            Some(text) => coerce(&text, record.value_type)?,
            None => Value::Str(out.output),
        };
        debug!(name, value = %value, "store command result");
        ctx.vars.set(name, value)?;
    }
    Ok(message)
}

/// Match `filter` at the start of `output` and return its capture group.
fn apply_filter(filter: &str, output: &str) -> Result<String, ScriptError> {
    let regex = compile_filter(filter).map_err(|reason| ScriptError::InvalidFilter {
        filter: filter.to_string(),
        reason,
    })?;
    regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str().to_string())
        .ok_or_else(|| ScriptError::FilterMatch {
            filter: filter.to_string(),
            output: output.to_string(),
        })
}

/// STATEMENT: evaluate an expression, then assert or assign its result.
///
/// With an expected value the result must equal it (assertion mode);
/// otherwise the result is only stored (assignment mode).
pub fn handle_statement(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    let message = expand(&record.message, ctx.vars)?;
    let expression = expand(record.expression()?, ctx.vars)?;
    let evaluation_error = |reason: String| ScriptError::StatementEvaluation {
        expression: expression.clone(),
        reason,
    };

    let result = evaluate(&expression, ctx.vars).map_err(|err| evaluation_error(format!("{err:#}")))?;
    let result = match record.value_type {
        ValueType::Integer => to_int(&result)
            .map(Value::Int)
            .map_err(|err| evaluation_error(format!("{err:#}")))?,
        ValueType::String => Value::Str(result.to_string()),
        ValueType::None => result,
    };
    debug!(expression = %expression, result = %result, "evaluated statement");

    if let Some(raw) = record.value.as_deref() {
        let expected_text = expand(raw, ctx.vars)?;
        let (expected, actual) = match record.value_type {
            ValueType::Integer => (coerce(&expected_text, ValueType::Integer)?, result.clone()),
            ValueType::String | ValueType::None => {
                (Value::Str(expected_text), Value::Str(result.to_string()))
            }
        };
        if expected != actual {
            return Err(ScriptError::AssertionMismatch { expected, actual });
        }
    }

    if let Some(name) = record.output_var.as_deref() {
        ctx.vars.set(name, result)?;
    }
    Ok(message)
}

/// COPY: copy `SOURCE DESTINATION` from the expanded expression.
pub fn handle_copy(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    let message = expand(&record.message, ctx.vars)?;
    let expression = expand(record.expression()?, ctx.vars)?;
    let (source, destination) = split_copy_paths(&expression)?;
    debug!(source, destination, "copy");
    copy_path(Path::new(source), Path::new(destination))?;
    Ok(message)
}

/// Convert expanded text to the declared type. Untyped text stays a string.
fn coerce(raw: &str, value_type: ValueType) -> Result<Value, ScriptError> {
    match value_type {
        ValueType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ScriptError::Coercion {
                value: raw.to_string(),
                target: "integer",
            }),
        ValueType::String | ValueType::None => Ok(Value::Str(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vars::EnvLayer;
    use crate::test_support::{ScriptedRunner, record};

    fn run_one(
        row: [&str; 8],
        vars: &mut Variables,
        runner: &ScriptedRunner,
    ) -> Result<String, ScriptError> {
        let record = record(row);
        let mut ctx = ExecContext { vars, runner };
        crate::dispatch::dispatch(&record, &mut ctx)
    }

    #[test]
    fn const_coerces_integers() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let msg = run_one(
            ["CONST", "NULL", "NULL", "INT", "3", "NULL", "x", "init"],
            &mut vars,
            &runner,
        )
        .expect("const");
        assert_eq!(msg, "init");
        assert_eq!(vars.get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn const_rejects_non_numeric_integer() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["CONST", "NULL", "NULL", "INT", "three", "NULL", "x", "init"],
            &mut vars,
            &runner,
        )
        .expect_err("coercion");
        assert!(matches!(err, ScriptError::Coercion { .. }));
    }

    #[test]
    fn const_expands_value_from_earlier_variables() {
        let mut vars = Variables::default();
        vars.set("base", Value::from("/srv")).expect("set");
        let runner = ScriptedRunner::default();
        run_one(
            ["CONST", "NULL", "NULL", "STR", "${base}/app", "NULL", "dir", "dir is ${base}"],
            &mut vars,
            &runner,
        )
        .expect("const");
        assert_eq!(vars.get("dir"), Some(&Value::from("/srv/app")));
    }

    #[test]
    fn env_writes_environment_layer_only() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        run_one(
            ["ENV", "NULL", "NULL", "NULL", "/opt/tool", "NULL", "TOOL_HOME", "m"],
            &mut vars,
            &runner,
        )
        .expect("env");
        assert_eq!(vars.get("TOOL_HOME"), None);
        assert_eq!(vars.env().get("TOOL_HOME"), Some("/opt/tool"));
    }

    #[test]
    fn run_captures_filtered_output() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(0, "hello world")]);
        run_one(
            ["RUN", "echo hello", "0", "STR", "NULL", "^(h\\w+)", "y", "capture"],
            &mut vars,
            &runner,
        )
        .expect("run");
        assert_eq!(vars.get("y"), Some(&Value::from("hello")));
        assert_eq!(runner.commands(), vec!["echo hello"]);
    }

    #[test]
    fn run_filter_coerces_integers() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(0, "total: 42 files")]);
        run_one(
            ["RUN", "count", "0", "INT", "NULL", "total: (\\d+)", "n", "m"],
            &mut vars,
            &runner,
        )
        .expect("run");
        assert_eq!(vars.get("n"), Some(&Value::Int(42)));
    }

    #[test]
    fn run_filter_is_anchored_at_start() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(0, "say hello")]);
        let err = run_one(
            ["RUN", "echo", "0", "STR", "NULL", "(hello)", "y", "m"],
            &mut vars,
            &runner,
        )
        .expect_err("no prefix match");
        assert!(matches!(err, ScriptError::FilterMatch { .. }));
        assert_eq!(vars.get("y"), None);
    }

    #[test]
    fn run_stores_raw_output_without_filter() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(0, "42")]);
        run_one(
            ["RUN", "echo 42", "0", "INT", "NULL", "NULL", "raw", "m"],
            &mut vars,
            &runner,
        )
        .expect("run");
        assert_eq!(vars.get("raw"), Some(&Value::from("42")));
    }

    #[test]
    fn run_exit_mismatch_stores_nothing() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(1, "hello")]);
        let err = run_one(
            ["RUN", "false", "0", "STR", "NULL", "(h\\w+)", "y", "must succeed"],
            &mut vars,
            &runner,
        )
        .expect_err("exit mismatch");
        assert!(matches!(
            err,
            ScriptError::UnexpectedExitCode {
                actual: 1,
                expected: 0,
                ..
            }
        ));
        assert_eq!(vars.get("y"), None);
    }

    #[test]
    fn run_accepts_expected_non_zero_exit() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::new([(2, "")]);
        run_one(
            ["RUN", "grep nothing file", "2", "NULL", "NULL", "NULL", "NULL", "m"],
            &mut vars,
            &runner,
        )
        .expect("exit 2 expected");
    }

    #[test]
    fn run_passes_exported_env_to_runner() {
        let mut vars = Variables::new(EnvLayer::default());
        vars.env_mut().set("STAGE", "test").expect("env");
        let runner = ScriptedRunner::new([(0, "")]);
        run_one(
            ["RUN", "make ${STAGE}", "0", "NULL", "NULL", "NULL", "NULL", "m"],
            &mut vars,
            &runner,
        )
        .expect("run");
        assert_eq!(runner.commands(), vec!["make test"]);
        assert_eq!(
            runner.envs(),
            vec![vec![("STAGE".to_string(), "test".to_string())]]
        );
    }

    #[test]
    fn statement_assignment_stores_result() {
        let mut vars = Variables::default();
        vars.set("x", Value::Int(3)).expect("set");
        let runner = ScriptedRunner::default();
        run_one(
            ["STATEMENT", "x * 2 + ${x}", "NULL", "NULL", "NULL", "NULL", "y", "m"],
            &mut vars,
            &runner,
        )
        .expect("statement");
        assert_eq!(vars.get("y"), Some(&Value::Int(9)));
    }

    #[test]
    fn statement_assertion_matches() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        run_one(
            ["STATEMENT", "'4' + '2'", "NULL", "INT", "42", "NULL", "answer", "m"],
            &mut vars,
            &runner,
        )
        .expect("statement");
        assert_eq!(vars.get("answer"), Some(&Value::Int(42)));
    }

    #[test]
    fn statement_untyped_assertion_compares_text() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        run_one(
            ["STATEMENT", "10 / 5", "NULL", "NULL", "2", "NULL", "NULL", "m"],
            &mut vars,
            &runner,
        )
        .expect("statement");
    }

    #[test]
    fn statement_mismatch_stores_nothing() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["STATEMENT", "1 + 1", "NULL", "INT", "3", "NULL", "two", "m"],
            &mut vars,
            &runner,
        )
        .expect_err("mismatch");
        match err {
            ScriptError::AssertionMismatch { expected, actual } => {
                assert_eq!(expected, Value::Int(3));
                assert_eq!(actual, Value::Int(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(vars.get("two"), None);
    }

    #[test]
    fn statement_faults_carry_expression() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["STATEMENT", "missing + 1", "NULL", "NULL", "NULL", "NULL", "NULL", "m"],
            &mut vars,
            &runner,
        )
        .expect_err("undefined");
        match err {
            ScriptError::StatementEvaluation { expression, reason } => {
                assert_eq!(expression, "missing + 1");
                assert!(reason.contains("not defined"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn statement_deep_nesting_is_evaluation_error() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let expression = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        let err = run_one(
            ["STATEMENT", expression.as_str(), "NULL", "NULL", "NULL", "NULL", "NULL", "m"],
            &mut vars,
            &runner,
        )
        .expect_err("too deep");
        assert!(matches!(err, ScriptError::StatementEvaluation { .. }));
    }

    #[test]
    fn statement_integer_coercion_failure_is_evaluation_error() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["STATEMENT", "'abc'", "NULL", "INT", "NULL", "NULL", "n", "m"],
            &mut vars,
            &runner,
        )
        .expect_err("not an int");
        assert!(matches!(err, ScriptError::StatementEvaluation { .. }));
    }

    #[test]
    fn message_fails_on_unresolved_reference() {
        let mut vars = Variables::default();
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["MESSAGE", "NULL", "NULL", "NULL", "NULL", "NULL", "NULL", "${undefined_var}"],
            &mut vars,
            &runner,
        )
        .expect_err("unresolved");
        assert!(matches!(err, ScriptError::UnresolvedReference { .. }));
    }

    #[test]
    fn copy_reports_missing_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut vars = Variables::default();
        vars.set("root", Value::from(temp.path().display().to_string()))
            .expect("set");
        let runner = ScriptedRunner::default();
        let err = run_one(
            ["COPY", "${root}/src ${root}/dst", "NULL", "NULL", "NULL", "NULL", "NULL", "copy it"],
            &mut vars,
            &runner,
        )
        .expect_err("missing source");
        assert!(matches!(err, ScriptError::SourceMissing { .. }));
    }
}
