//! Stable exit codes for scripter CLI commands.

/// Script ran to the end, or `check` found no invalid rows.
pub const OK: i32 = 0;
/// A record failed, the script is invalid, or the input/config could not be read.
pub const FAILED: i32 = 1;
/// Stopped by Ctrl+C before the next record.
pub const INTERRUPTED: i32 = 130;
