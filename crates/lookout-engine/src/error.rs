//! Engine error types.

use thiserror::Error;

use crate::debugger::ExceptionDetails;
use crate::value::Value;

/// A value thrown by script, with where it was thrown.
#[derive(Debug, Clone, PartialEq)]
pub struct JsException {
    pub value: Value,
    pub details: ExceptionDetails,
}

/// Errors reported by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Script threw and nothing caught it.
    #[error("uncaught exception: {}", .0.details.text)]
    Thrown(Box<JsException>),

    /// Source text could not be compiled.
    #[error("syntax error at line {line}: {message}")]
    Syntax {
        /// 1-based line of the offending source.
        line: u32,
        message: String,
    },

    /// A handle did not refer to a live object.
    #[error("invalid object handle: {0}")]
    InvalidHandle(u64),

    /// The operation needs an object but got a primitive.
    #[error("not an object: {0}")]
    NotAnObject(String),

    /// The engine thread is gone.
    #[error("engine thread is not running")]
    Disconnected,
}

impl EngineError {
    pub fn thrown(value: Value, details: ExceptionDetails) -> Self {
        EngineError::Thrown(Box::new(JsException { value, details }))
    }
}
