//! Adapter error types.
//!
//! Every variant is a request-level failure answered with an error
//! response; nothing here ever crosses into the engine.

use lookout_protocol::{ErrorCode, Response};
use thiserror::Error;

/// Errors reported back to the client for a single request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// A `Debugger.*` request arrived while the debugger is disabled.
    #[error("Debugger agent is not enabled")]
    DebuggerNotEnabled,

    /// No handler exists for the method.
    #[error("{0} wasn't found")]
    MethodNotFound(String),

    /// Params of a known method failed to decode.
    #[error("invalid params for {method}: {message}")]
    InvalidParams {
        /// Method of the offending request.
        method: String,
        /// Decoder diagnostic.
        message: String,
    },

    /// A remote object id or heap object id does not resolve.
    #[error("Object is not available")]
    ObjectNotAvailable,

    #[error("unknown execution context id {0}")]
    UnknownExecutionContext(i64),

    /// `Runtime.callFunctionOn` needs exactly one target.
    #[error("The request must specify either object id or execution context id.")]
    AmbiguousCallTarget,

    #[error("invalid unserializable value: {0}")]
    InvalidUnserializableValue(String),

    #[error("Unknown breakpoint ID: {0}")]
    UnknownBreakpoint(String),

    #[error("Unknown instrumentation breakpoint: {0}")]
    UnknownInstrumentation(String),

    #[error("Unknown pause-on-exception state: {0}")]
    UnknownPauseOnExceptionState(String),

    #[error("invalid script id: {0}")]
    InvalidScriptId(String),

    /// A line or column does not fit the engine's position range.
    #[error("invalid location: {0} is out of range")]
    InvalidLocation(i64),

    #[error("invalid call frame id: {0}")]
    InvalidCallFrameId(String),

    /// `setBreakpointByUrl` got neither `url` nor `urlRegex`.
    #[error("setBreakpointByUrl requires url or urlRegex")]
    MissingUrl,

    #[error("invalid urlRegex {pattern}: {message}")]
    InvalidUrlRegex {
        /// The rejected pattern.
        pattern: String,
        /// Regex compiler diagnostic.
        message: String,
    },

    #[error("no loaded script matches urlRegex {0}")]
    NoScriptMatches(String),

    /// The engine could not place the breakpoint.
    #[error("could not set breakpoint")]
    BreakpointNotSet,

    /// Profiler output was not valid JSON.
    #[error("profile output could not be parsed")]
    ProfileParse,

    /// A queued evaluation lost its pause to a resume.
    #[error("Evaluation aborted: execution resumed")]
    EvaluationAborted,

    /// The engine failed a value operation.
    #[error("engine error: {0}")]
    Engine(String),
}

impl AdapterError {
    /// Wire error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            AdapterError::InvalidParams { .. } => ErrorCode::InvalidRequest,
            AdapterError::ProfileParse => ErrorCode::InternalError,
            _ => ErrorCode::ServerError,
        }
    }

    /// Error response answering request `id`.
    pub fn to_response(&self, id: i64) -> Response {
        Response::error(id, self.code(), self.to_string())
    }
}

impl From<lookout_engine::EngineError> for AdapterError {
    fn from(err: lookout_engine::EngineError) -> Self {
        AdapterError::Engine(err.to_string())
    }
}
