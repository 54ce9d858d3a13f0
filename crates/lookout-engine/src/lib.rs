//! lookout-engine: the script engine interface the debugger adapter is
//! written against, plus [`scripted::ScriptedEngine`], a small interpreter
//! implementing it.

pub mod debugger;
pub mod engine;
pub mod error;
pub mod scripted;
pub mod value;

pub use debugger::{
    AsyncPauseKind, BreakpointId, BreakpointInfo, CallFrameInfo, Command, EvalResult,
    ExceptionDetails, LexicalInfo, PauseOnThrowMode, PauseReason, ProgramState, ScriptId,
    SourceLocation, StepMode, VariableInfo,
};
pub use engine::{
    Engine, EventObserver, HeapStatsCallback, HeapStatsEntry, HeapUsage, HostFunction,
    Instrumentation, PreparedScript, RuntimeHandle,
};
pub use error::{EngineError, JsException};
pub use scripted::{EngineThread, ScriptedEngine, ScriptedHandle};
pub use value::{format_number, ObjectKind, ObjectRef, Value};
