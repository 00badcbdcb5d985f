//! The variable environment shared by every record of a run.
//!
//! Two layers:
//!
//! - the **transient store**: typed values written by CONST, RUN and STATEMENT;
//! - the **environment layer**: a snapshot of the host environment taken when
//!   the run starts, plus every write made by ENV records. Those writes are
//!   exported to child processes spawned later in the run.
//!
//! Lookups consult the transient store first, so a transient entry shadows an
//! environment variable of the same name.

use std::collections::BTreeMap;

use crate::core::types::Value;
use crate::error::ScriptError;

/// Environment layer: inherited variables plus writes made during the run.
#[derive(Debug, Clone, Default)]
pub struct EnvLayer {
    inherited: BTreeMap<String, String>,
    exported: BTreeMap<String, String>,
}

impl EnvLayer {
    /// Start from the given variables (usually `std::env::vars()`).
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            inherited: vars.into_iter().collect(),
            exported: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.exported
            .get(name)
            .or_else(|| self.inherited.get(name))
            .map(String::as_str)
    }

    /// Set a variable for the rest of the run.
    ///
    /// Names and values follow the rules of the host environment: the name must
    /// be non-empty and free of `=` and NUL, the value free of NUL.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ScriptError> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains('=') {
            Some("name contains '='")
        } else if name.contains('\0') {
            Some("name contains a NUL byte")
        } else if value.contains('\0') {
            Some("value contains a NUL byte")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ScriptError::EnvironmentWrite {
                name: name.to_string(),
                reason: reason.to_string(),
            });
        }
        if value.is_empty() {
            return Err(ScriptError::EmptyValue {
                name: name.to_string(),
            });
        }
        self.exported.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Variables written during the run, to be passed to child processes.
    pub fn exported(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exported
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Transient store layered over the environment.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    transient: BTreeMap<String, Value>,
    env: EnvLayer,
}

impl Variables {
    pub fn new(env: EnvLayer) -> Self {
        Self {
            transient: BTreeMap::new(),
            env,
        }
    }

    /// Resolve a name: transient store first, then the environment layer.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.transient.get(name) {
            return Some(value.clone());
        }
        self.env.get(name).map(Value::from)
    }

    /// Store a value in the transient store. Empty strings are rejected.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        if value.is_empty() {
            return Err(ScriptError::EmptyValue {
                name: name.to_string(),
            });
        }
        self.transient.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.transient.get(name)
    }

    pub fn transient(&self) -> &BTreeMap<String, Value> {
        &self.transient
    }

    pub fn env(&self) -> &EnvLayer {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut EnvLayer {
        &mut self.env
    }
}
