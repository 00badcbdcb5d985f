//! Running RUN commands through the shell.
//!
//! The [`CommandRunner`] trait decouples the RUN handler from process
//! spawning. Tests use scripted runners that return canned outputs.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, instrument, warn};

use crate::error::ScriptError;

/// Exit status and cleaned output of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Stdout with line breaks removed and surrounding whitespace trimmed.
    pub output: String,
}

/// Abstraction over command execution backends.
pub trait CommandRunner {
    /// Run `command_line`, exporting `env` to the child on top of the inherited
    /// environment. A non-zero exit is not an error.
    fn run(&self, command_line: &str, env: &[(&str, &str)]) -> Result<CommandOutput, ScriptError>;
}

/// Runs commands through a shell (`sh -c` by default).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<String>,
    output_limit_bytes: usize,
    inherit_env: bool,
}

impl ShellRunner {
    pub fn new(shell: Vec<String>, output_limit_bytes: usize) -> Self {
        Self {
            shell,
            output_limit_bytes,
            inherit_env: true,
        }
    }

    /// When `false`, children see only the variables passed to `run`.
    pub fn with_inherit_env(mut self, inherit_env: bool) -> Self {
        self.inherit_env = inherit_env;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(vec!["sh".to_string(), "-c".to_string()], 1024 * 1024)
    }
}

impl CommandRunner for ShellRunner {
    #[instrument(skip_all, fields(command = command_line))]
    fn run(&self, command_line: &str, env: &[(&str, &str)]) -> Result<CommandOutput, ScriptError> {
        let io_err = |err: std::io::Error| ScriptError::CommandIo {
            command: command_line.to_string(),
            err,
        };
        let (program, args) = self.shell.split_first().ok_or_else(|| {
            io_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "shell is not configured",
            ))
        })?;

        let mut cmd = Command::new(program);
        if !self.inherit_env {
            cmd.env_clear();
        }
        cmd.args(args)
            .arg(command_line)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning shell");
        let mut child = cmd.spawn().map_err(io_err)?;

        let missing = |stream: &str| {
            io_err(std::io::Error::other(format!("{stream} was not piped")))
        };
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let limit = self.output_limit_bytes;
        let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
        let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

        let status = child.wait().map_err(io_err)?;
        let (stdout, stdout_truncated) = join_output(stdout_handle).map_err(io_err)?;
        let (stderr, stderr_truncated) = join_output(stderr_handle).map_err(io_err)?;

        if stdout_truncated > 0 || stderr_truncated > 0 {
            warn!(stdout_truncated, stderr_truncated, "output truncated");
        }
        if !stderr.is_empty() {
            debug!(stderr = %String::from_utf8_lossy(&stderr).trim_end(), "command stderr");
        }

        let exit_code = exit_code(status);
        let output = clean_output(&String::from_utf8_lossy(&stdout));
        debug!(exit_code, output = %output, "command finished");
        Ok(CommandOutput { exit_code, output })
    }
}

/// Remove line breaks so filters see a single line, then trim.
pub fn clean_output(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
) -> std::io::Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::other("output reader thread panicked")),
    }
}

/// Read a stream to the end, keeping at most `limit` bytes.
///
/// Bytes past the limit are drained and counted so the child never blocks on
/// a full pipe.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
