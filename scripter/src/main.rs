//! Run CSV-described shell scripts.
//!
//! Each row of the input file is one record; records run in order and the
//! first failure stops the script.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use scripter::core::vars::{EnvLayer, Variables};
use scripter::error::RowError;
use scripter::exit_codes;
use scripter::interpreter::{Interpreter, RunStop, StdoutReporter, check_rows};
use scripter::io::command::ShellRunner;
use scripter::io::config::{ScripterConfig, load_config};
use scripter::io::interrupt::{StopFlag, install_ctrl_c};
use scripter::io::source::RecordSource;
use scripter::logging;

const DEFAULT_CONFIG: &str = "scripter.toml";

#[derive(Parser)]
#[command(name = "scripter", version, about = "Run CSV-described shell scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the script, printing one status line per record.
    Run {
        #[command(flatten)]
        common: CommonArgs,
        /// Print the final variables as JSON unless a record failed.
        #[arg(long)]
        dump_vars: bool,
    },
    /// Validate every row without executing anything.
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Script file (CSV with a header row).
    file: PathBuf,
    /// Config file; defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Tracing level when `RUST_LOG` is unset (e.g. `info`, `debug`).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { common, dump_vars } => {
            logging::init(common.log_level.as_deref());
            let config = load_config(&common.config)?;
            cmd_run(&common.file, &config, dump_vars)
        }
        Command::Check { common } => {
            logging::init(common.log_level.as_deref());
            let config = load_config(&common.config)?;
            cmd_check(&common.file, &config)
        }
    }
}

fn cmd_run(file: &Path, config: &ScripterConfig, dump_vars: bool) -> Result<i32> {
    let source = RecordSource::open(file, config.delimiter_byte())?;
    let env = if config.inherit_env {
        EnvLayer::from_vars(std::env::vars())
    } else {
        EnvLayer::default()
    };
    let runner = ShellRunner::new(config.shell.clone(), config.output_limit_bytes)
        .with_inherit_env(config.inherit_env);
    let stop = StopFlag::new();
    install_ctrl_c(stop.clone()).context("install Ctrl+C handler")?;

    let mut interpreter = Interpreter::new(Variables::new(env), &runner, config.sentinel.as_str())
        .with_stop_flag(stop.clone());
    let summary = match interpreter.run(source, &mut StdoutReporter) {
        Ok(summary) => summary,
        Err(err) => {
            if let Some(row) = err.downcast_ref::<RowError>() {
                eprintln!("{row}");
                // A child killed by the same Ctrl+C fails its record.
                if stop.is_raised() {
                    return Ok(exit_codes::INTERRUPTED);
                }
                return Ok(exit_codes::FAILED);
            }
            return Err(err).with_context(|| format!("run {}", file.display()));
        }
    };

    if dump_vars {
        println!("{}", interpreter.dump_vars()?);
    }
    match summary.stop {
        RunStop::Finished => Ok(exit_codes::OK),
        RunStop::Interrupted => {
            eprintln!("interrupted after {} records", summary.records);
            Ok(exit_codes::INTERRUPTED)
        }
    }
}

fn cmd_check(file: &Path, config: &ScripterConfig) -> Result<i32> {
    let source = RecordSource::open(file, config.delimiter_byte())?;
    let errors =
        check_rows(source, &config.sentinel).with_context(|| format!("check {}", file.display()))?;
    if errors.is_empty() {
        println!("{}: ok", file.display());
        return Ok(exit_codes::OK);
    }
    for error in &errors {
        eprintln!("{error}");
    }
    eprintln!("{}: {} invalid rows", file.display(), errors.len());
    Ok(exit_codes::FAILED)
}
