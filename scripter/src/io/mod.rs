//! Side-effecting helpers: CSV input, config, commands, copying, signals.

pub mod command;
pub mod config;
pub mod copy;
pub mod interrupt;
pub mod source;
