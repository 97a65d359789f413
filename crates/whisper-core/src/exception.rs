//! The exception taxonomy: `spec.md` §7's `Exc` data (a heap `Exception`
//! object carried through the frame spine) plus the ambient `RunError`
//! surfaced by the host-facing setup functions in §6, which are ordinary
//! fallible Rust calls rather than interpreter control-flow values.

use std::collections::HashMap;

use crate::heap::HeapId;
use crate::value::ValBox;

/// A catalog of the recoverable exception shapes the core itself raises.
/// User code raising its own exceptions (not specified by `spec.md`, out
/// of this core's scope) would extend this with a `Custom` arm carrying
/// its own message; this rewrite does not add one because no handler in
/// §4.6 needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum ExcKind {
    SyntaxMethodNotFound,
    NotCallable,
    WrongArity,
    NameNotFound,
    RetcontNotFound,
    RetcontNotAnObject,
    RetcontNotAContinuation,
    ReturnOutsideFunction,
    VoidWhereValueRequired,
    BadOperandType,
    IntegerOverflow,
    DivisionByZero,
    DotHandlerNotFound,
}

/// The payload of a heap `Exception` object: a human-readable message
/// plus context arguments, per `spec.md` §7 ("carries a human-readable
/// message plus zero or more `Box` arguments for context").
#[derive(Debug)]
pub struct ExceptionData {
    pub kind: ExcKind,
    pub message: String,
    pub args: Vec<ValBox>,
}

impl ExceptionData {
    pub fn new(kind: ExcKind, message: impl Into<String>, args: Vec<ValBox>) -> ExceptionData {
        ExceptionData {
            kind,
            message: message.into(),
            args,
        }
    }

    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        for arg in &self.args {
            if let Some(id) = arg.as_object_ref() {
                out.push(id);
            }
            if let Some(id) = arg.as_heap_string_ref() {
                out.push(id);
            }
        }
    }

    pub(crate) fn update(&mut self, forwarding: &HashMap<HeapId, HeapId>) {
        for arg in &mut self.args {
            crate::heap::forward_value(arg, forwarding);
        }
    }
}

/// Host-facing setup/IO failures (`spec.md` §6's `create_runtime`,
/// `register_thread`, …), distinct from the interpreter's own `Exc`/
/// `Error` data values, which travel through `EvalResult`/`CallResult`
/// instead of `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    ThreadAlreadyRegistered,
    SourceUnreadable(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::ThreadAlreadyRegistered => f.write_str("thread already registered on this runtime"),
            RunError::SourceUnreadable(reason) => write!(f, "source file could not be read: {reason}"),
        }
    }
}

impl std::error::Error for RunError {}

pub type RunResult<T> = Result<T, RunError>;
