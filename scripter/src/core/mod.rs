//! Pure script logic: record model, validation, expansion, evaluation.
//!
//! Nothing here spawns processes or touches the filesystem.

pub mod expand;
pub mod expr;
pub mod record;
pub mod schema;
pub mod types;
pub mod vars;
