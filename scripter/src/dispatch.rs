use crate::core::record::Record;
use crate::core::types::OperationKind;
use crate::error::ScriptError;
use crate::handlers::{
    ExecContext, handle_const, handle_copy, handle_env, handle_message, handle_run,
    handle_statement,
};

/// Route a validated record to its handler. Returns the expanded message.
pub fn dispatch(record: &Record, ctx: &mut ExecContext<'_>) -> Result<String, ScriptError> {
    match record.kind {
        OperationKind::Const => handle_const(record, ctx),
        OperationKind::Env => handle_env(record, ctx),
        OperationKind::Run => handle_run(record, ctx),
        OperationKind::Message => handle_message(record, ctx),
        OperationKind::Statement => handle_statement(record, ctx),
        OperationKind::Copy => handle_copy(record, ctx),
    }
}
