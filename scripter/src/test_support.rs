//! Test-only helpers: scripted command runner, row builders, recording reporter.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::Result;

use crate::core::record::Record;
use crate::core::schema::validate_and_build;
use crate::error::ScriptError;
use crate::interpreter::{Reporter, status_line};
use crate::io::command::{CommandOutput, CommandRunner};
use crate::io::source::RawRow;

/// Command runner that returns canned `(exit_code, output)` pairs in order.
///
/// Once the script is used up every command exits 0 with empty output.
/// Commands and the environment they were given are recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: RefCell<VecDeque<(i32, String)>>,
    commands: RefCell<Vec<String>>,
    envs: RefCell<Vec<Vec<(String, String)>>>,
}

impl ScriptedRunner {
    pub fn new<'a, I>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (i32, &'a str)>,
    {
        Self {
            outputs: RefCell::new(
                outputs
                    .into_iter()
                    .map(|(code, output)| (code, output.to_string()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn envs(&self) -> Vec<Vec<(String, String)>> {
        self.envs.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command_line: &str, env: &[(&str, &str)]) -> Result<CommandOutput, ScriptError> {
        self.commands.borrow_mut().push(command_line.to_string());
        self.envs.borrow_mut().push(
            env.iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        );
        let (exit_code, output) = self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or((0, String::new()));
        Ok(CommandOutput { exit_code, output })
    }
}

/// Build a validated record from eight cells (sentinel `NULL`, line 2).
pub fn record(cells: [&str; 8]) -> Record {
    validate_and_build(2, cells.as_slice(), "NULL").expect("valid row")
}

/// Raw rows numbered from line 2, as if read after a header.
pub fn raw_rows(rows: &[[&str; 8]]) -> Vec<Result<RawRow>> {
    rows.iter()
        .zip(2u64..)
        .map(|(cells, line)| {
            Ok(RawRow {
                line,
                cells: cells.iter().map(|cell| (*cell).to_string()).collect(),
            })
        })
        .collect()
}

/// Reporter that keeps the rendered status lines.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub lines: Vec<String>,
}

impl Reporter for RecordingReporter {
    fn report(&mut self, line: u64, message: &str, ok: bool) {
        self.lines.push(status_line(line, message, ok));
    }
}
