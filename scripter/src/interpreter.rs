//! The run loop: validate, dispatch and report records in order.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::expand::expand;
use crate::core::schema::{row_kind, validate_and_build};
use crate::core::vars::Variables;
use crate::dispatch::dispatch;
use crate::error::RowError;
use crate::handlers::ExecContext;
use crate::io::command::CommandRunner;
use crate::io::interrupt::StopFlag;
use crate::io::source::RawRow;

/// Receives one status line per executed record.
pub trait Reporter {
    fn report(&mut self, line: u64, message: &str, ok: bool);
}

/// Render the status line for a record.
pub fn status_line(line: u64, message: &str, ok: bool) -> String {
    let status = if ok { "[ OK ]" } else { "[ FAILED ]" };
    format!("line {line}: {message}...{status}")
}

/// Prints status lines to stdout.
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&mut self, line: u64, message: &str, ok: bool) {
        println!("{}", status_line(line, message, ok));
    }
}

/// Why `Interpreter::run` returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Every record ran.
    Finished,
    /// The stop flag was raised; the next record was not started.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub stop: RunStop,
}

/// Executes records against one variable environment.
pub struct Interpreter<'a> {
    vars: Variables,
    runner: &'a dyn CommandRunner,
    sentinel: String,
    stop: StopFlag,
}

impl<'a> Interpreter<'a> {
    pub fn new(vars: Variables, runner: &'a dyn CommandRunner, sentinel: impl Into<String>) -> Self {
        Self {
            vars,
            runner,
            sentinel: sentinel.into(),
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn vars(&self) -> &Variables {
        &self.vars
    }

    /// Run `rows` in order.
    ///
    /// The first failing record stops the run; the error is a [`RowError`]
    /// (reachable with `downcast_ref`). Effects of earlier records stay.
    #[instrument(skip_all)]
    pub fn run<I>(&mut self, rows: I, reporter: &mut dyn Reporter) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawRow>>,
    {
        info!("run started");
        let mut records = 0usize;
        for row in rows {
            if self.stop.is_raised() {
                info!(records, "run interrupted");
                return Ok(RunSummary {
                    records,
                    stop: RunStop::Interrupted,
                });
            }
            let row = row?;
            self.run_row(&row, reporter)?;
            records += 1;
        }
        info!(records, "run finished");
        debug!(vars = %self.dump_vars()?, "final variables");
        Ok(RunSummary {
            records,
            stop: RunStop::Finished,
        })
    }

    fn run_row(&mut self, row: &RawRow, reporter: &mut dyn Reporter) -> Result<()> {
        let record = match validate_and_build(row.line, row.cells.as_slice(), &self.sentinel) {
            Ok(record) => record,
            Err(error) => {
                let message = row.cells.last().map_or("", String::as_str);
                reporter.report(row.line, message, false);
                let kind = row_kind(row.cells.as_slice());
                return Err(RowError::new(row.line, kind, error).into());
            }
        };

        debug!(line = record.line, kind = %record.kind, "dispatch");
        let mut ctx = ExecContext {
            vars: &mut self.vars,
            runner: self.runner,
        };
        match dispatch(&record, &mut ctx) {
            Ok(message) => {
                reporter.report(record.line, &message, true);
                Ok(())
            }
            Err(error) => {
                let message =
                    expand(&record.message, &self.vars).unwrap_or_else(|_| record.message.clone());
                reporter.report(record.line, &message, false);
                Err(RowError::new(record.line, Some(record.kind), error).into())
            }
        }
    }

    /// Transient store as pretty JSON.
    pub fn dump_vars(&self) -> Result<String> {
        serde_json::to_string_pretty(self.vars.transient()).context("serialize variables")
    }
}

/// Validate every row without executing anything.
///
/// Returns one error per invalid row. Unreadable input aborts the check.
pub fn check_rows<I>(rows: I, sentinel: &str) -> Result<Vec<RowError>>
where
    I: IntoIterator<Item = Result<RawRow>>,
{
    let mut errors = Vec::new();
    for row in rows {
        let row = row?;
        if let Err(error) = validate_and_build(row.line, row.cells.as_slice(), sentinel) {
            let kind = row_kind(row.cells.as_slice());
            errors.push(RowError::new(row.line, kind, error));
        }
    }
    Ok(errors)
}
