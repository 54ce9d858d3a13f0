//! Debugger-facing data exchanged with the engine at pause points.
//!
//! Lines and columns in this module are 1-based, as engines count them.

use crate::value::Value;

/// Engine-assigned id of a loaded script. Zero means "no script".
pub type ScriptId = u32;

/// Engine-assigned id of a native breakpoint.
pub type BreakpointId = u64;

/// Why the engine invoked the pause callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// A script finished parsing and is about to run its first statement.
    ScriptLoaded,
    DebuggerStatement,
    Breakpoint,
    StepFinish,
    /// A value was thrown and the pause-on-throw mode asked to stop.
    Exception,
    /// Requested through [`AsyncPauseKind::Implicit`].
    AsyncTrigger,
    /// Requested through [`AsyncPauseKind::Explicit`].
    AsyncTriggerExplicit,
    /// A [`Command::Eval`] finished; the result is in the program state.
    EvalComplete,
}

/// Who asked for an asynchronous pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncPauseKind {
    /// The debugger itself needs the engine thread, e.g. to process queued work.
    Implicit,
    /// The user asked execution to stop.
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Into,
    Over,
    Out,
}

/// What the engine should do when the pause callback returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Continue,
    Step(StepMode),
    /// Evaluate `expression` in frame `frame_index` (0 = innermost), then
    /// pause again with [`PauseReason::EvalComplete`].
    Eval {
        expression: String,
        frame_index: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseOnThrowMode {
    #[default]
    None,
    All,
    Uncaught,
}

/// A position in a script.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file_id: ScriptId,
    pub file_name: String,
    pub line: u32,
    pub column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub id: BreakpointId,
    pub enabled: bool,
    /// Whether the breakpoint is bound to a loaded script.
    pub resolved: bool,
    pub requested_location: SourceLocation,
    pub resolved_location: Option<SourceLocation>,
    pub condition: Option<String>,
}

/// One frame of the engine call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrameInfo {
    pub function_name: String,
    pub location: SourceLocation,
}

/// Shape of the lexical environment of a frame: one entry per scope,
/// innermost first, holding that scope's variable count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LexicalInfo {
    variable_counts: Vec<u32>,
}

impl LexicalInfo {
    pub fn new(variable_counts: Vec<u32>) -> Self {
        Self { variable_counts }
    }

    pub fn scopes_count(&self) -> u32 {
        self.variable_counts.len() as u32
    }

    pub fn variables_in_scope(&self, scope: u32) -> u32 {
        self.variable_counts
            .get(scope as usize)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub value: Value,
}

/// Where and why a value was thrown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExceptionDetails {
    pub text: String,
    pub location: SourceLocation,
    pub stack: Vec<CallFrameInfo>,
}

/// Outcome of an evaluation: a value, or a thrown value with details.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub value: Value,
    pub exception: Option<ExceptionDetails>,
}

impl EvalResult {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            exception: None,
        }
    }

    pub fn thrown(value: Value, details: ExceptionDetails) -> Self {
        Self {
            value,
            exception: Some(details),
        }
    }

    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }
}

/// Snapshot of the paused program, valid only inside the pause callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramState {
    pub pause_reason: PauseReason,
    /// Innermost frame first.
    pub stack: Vec<CallFrameInfo>,
    /// Set when `pause_reason` is [`PauseReason::EvalComplete`].
    pub eval_result: Option<EvalResult>,
    /// Set when `pause_reason` is [`PauseReason::Breakpoint`].
    pub breakpoint: Option<BreakpointId>,
}

impl ProgramState {
    pub fn top_frame(&self) -> Option<&CallFrameInfo> {
        self.stack.first()
    }
}
