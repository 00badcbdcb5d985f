//! Interpreter for CSV-described shell scripts.
//!
//! Each CSV row is one record: define a constant, set an environment variable,
//! run a command, print a message, evaluate a statement or copy files. Records
//! run strictly in order against one variable environment and the first
//! failure stops the run.
//!
//! - **[`core`]**: pure logic (record model, schema validation, `${name}`
//!   expansion, the statement evaluator, the variable environment).
//! - **[`io`]**: side effects (CSV input, config, shell commands, copying,
//!   Ctrl+C).
//!
//! [`interpreter`] ties them together through [`dispatch`] and [`handlers`].

pub mod core;
pub mod dispatch;
pub mod error;
pub mod exit_codes;
pub mod handlers;
pub mod interpreter;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
