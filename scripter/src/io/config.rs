//! Interpreter configuration loaded from an optional TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::schema::DEFAULT_SENTINEL;

/// Interpreter configuration (TOML).
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScripterConfig {
    /// Token marking an intentionally absent column.
    pub sentinel: String,

    /// Program and leading arguments used to run RUN commands
    /// (the command line is appended as the last argument).
    pub shell: Vec<String>,

    /// Seed the environment layer from the host environment. When `false`,
    /// `${NAME}` sees only ENV writes and RUN children start from an empty
    /// environment plus those writes.
    pub inherit_env: bool,

    /// Keep at most this many bytes of a command's stdout/stderr.
    pub output_limit_bytes: usize,

    /// CSV field delimiter.
    pub delimiter: char,
}

impl Default for ScripterConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            shell: vec!["sh".to_string(), "-c".to_string()],
            inherit_env: true,
            output_limit_bytes: 1024 * 1024,
            delimiter: ',',
        }
    }
}

impl ScripterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            return Err(anyhow!("sentinel must be non-empty"));
        }
        if self.shell.is_empty() || self.shell[0].trim().is_empty() {
            return Err(anyhow!("shell must be a non-empty array"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(anyhow!(
                "delimiter must be a single ASCII character other than '\"' and newline"
            ));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV reader expects. Valid after `validate`.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ScripterConfig::default()`.
pub fn load_config(path: &Path) -> Result<ScripterConfig> {
    if !path.exists() {
        let cfg = ScripterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ScripterConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
