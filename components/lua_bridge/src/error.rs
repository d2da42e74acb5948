//! Error types for the interpreter bridge.
//!
//! Every bridge operation that can fail returns [`BridgeResult`]. Type
//! mismatches raised inside a native callable propagate with `?` and surface
//! as a Lua error at the nearest protected call.

use crate::reference::RefHandle;
use thiserror::Error;

/// Errors produced by the bridge
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// The interpreter could not be created or configured
    #[error("interpreter initialization failed: {0}")]
    Init(String),

    /// The stack entry does not carry the tag the operation requires
    #[error("C-Lua stack value type mismatch (expected {expected}, found {found})")]
    TypeMismatch {
        /// Tag the operation needed
        expected: &'static str,
        /// Tag actually found on the stack
        found: &'static str,
    },

    /// Fewer values on the stack than the operation consumes
    #[error("stack underflow: needed {needed} values, found {available}")]
    StackUnderflow {
        /// Values the operation consumes
        needed: usize,
        /// Values present
        available: usize,
    },

    /// Stack index out of range
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// Reference handle was never issued or was already released
    #[error("invalid or released reference {0}")]
    InvalidReference(RefHandle),

    /// A protected call failed inside the interpreter
    #[error("error running function: {0}")]
    CallFailed(String),

    /// A chunk failed to compile
    #[error("error loading chunk {name}: {message}")]
    Load {
        /// Chunk name
        name: String,
        /// Compiler message
        message: String,
    },

    /// File I/O error on the host side
    #[error("io error: {0}")]
    Io(String),

    /// Any other interpreter error
    #[error("interpreter error: {0}")]
    Lua(String),

    /// A shared instance already exists on this thread
    #[error("an interpreter bridge is already installed on this thread")]
    AlreadyInstalled,

    /// The shared instance is borrowed by an enclosing call
    #[error("the shared interpreter bridge is already in use")]
    InstanceBusy,
}

impl BridgeError {
    /// Build a type mismatch error
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        BridgeError::TypeMismatch { expected, found }
    }
}

impl From<mlua::Error> for BridgeError {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => BridgeError::Load {
                name: "chunk".to_string(),
                message,
            },
            mlua::Error::MemoryError(msg) => BridgeError::Lua(msg),
            other => BridgeError::Lua(error_message(&other)),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

/// Extracts the innermost human-readable message from an interpreter error.
///
/// Errors raised by host functions arrive wrapped in callback errors, and
/// runtime errors carry a traceback appended by the interpreter; both are
/// stripped down to the message itself.
pub fn error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => strip_traceback(msg).to_string(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::MemoryError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => error_message(cause),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

fn strip_traceback(msg: &str) -> &str {
    msg.split("\nstack traceback:").next().unwrap_or(msg)
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
