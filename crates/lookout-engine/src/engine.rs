//! The interface a script engine exposes to a debugger.
//!
//! Everything on [`Engine`] and [`Instrumentation`] must be called on the
//! engine thread. The debugger half of [`Engine`] (program state, lexical
//! info, variable info) is only meaningful while the engine is inside
//! [`EventObserver::did_pause`]. [`RuntimeHandle`] is the one piece that
//! may be used from any thread.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::debugger::{
    AsyncPauseKind, BreakpointId, BreakpointInfo, Command, LexicalInfo, PauseOnThrowMode,
    ProgramState, ScriptId, SourceLocation, VariableInfo,
};
use crate::error::EngineError;
use crate::value::Value;

/// Native function callable from script: `(engine, this, args)`.
pub type HostFunction =
    Arc<dyn Fn(&mut dyn Engine, &Value, &[Value]) -> Result<Value, EngineError> + Send + Sync>;

/// Receives heap tracking updates: last seen object id, wall-clock
/// timestamp since the Unix epoch, and per-fragment statistics.
pub type HeapStatsCallback = Box<dyn FnMut(u64, Duration, &[HeapStatsEntry]) + Send>;

/// Registered with the engine; invoked on the engine thread whenever
/// execution halts. The returned command tells the engine how to proceed.
pub trait EventObserver: Send + Sync {
    fn did_pause(&self, engine: &mut dyn Engine) -> Command;
}

/// Thread-safe handle for waking the engine.
pub trait RuntimeHandle: Send + Sync {
    /// Ask the engine to invoke the pause callback at its next opportunity.
    fn trigger_async_pause(&self, kind: AsyncPauseKind);

    /// Make an idle engine run something, so a pending async pause is
    /// delivered even when no script is executing.
    fn tickle(&self);
}

/// Opaque handle to a compiled but not yet executed script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreparedScript(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapUsage {
    pub used_size: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStatsEntry {
    pub fragment_index: u64,
    pub count: u64,
    pub size: u64,
}

pub trait Engine {
    // -- debugger ---------------------------------------------------------

    fn set_event_observer(&mut self, observer: Option<Arc<dyn EventObserver>>);
    fn set_should_pause_on_script_load(&mut self, pause: bool);
    fn set_debugger_attached(&mut self, attached: bool);

    fn program_state(&self) -> ProgramState;
    fn lexical_info(&self, frame: u32) -> LexicalInfo;
    fn variable_info(&self, frame: u32, scope: u32, index: u32) -> Option<VariableInfo>;
    fn this_info(&self, frame: u32) -> Value;
    fn source_mapping_url(&self, file_id: ScriptId) -> Option<String>;

    /// Returns `None` when the location cannot hold a breakpoint.
    fn set_breakpoint(&mut self, location: SourceLocation) -> Option<BreakpointId>;
    fn set_breakpoint_condition(&mut self, id: BreakpointId, condition: &str);
    fn breakpoint_info(&self, id: BreakpointId) -> Option<BreakpointInfo>;
    fn delete_breakpoint(&mut self, id: BreakpointId);
    fn delete_all_breakpoints(&mut self);
    fn set_pause_on_throw_mode(&mut self, mode: PauseOnThrowMode);

    // -- values -----------------------------------------------------------

    fn global(&mut self) -> Value;
    fn get_property(&mut self, object: &Value, name: &str) -> Result<Value, EngineError>;
    fn set_property(&mut self, object: &Value, name: &str, value: Value)
        -> Result<(), EngineError>;
    /// Own property names in definition order.
    fn own_property_names(&mut self, object: &Value) -> Result<Vec<String>, EngineError>;
    fn prototype_of(&mut self, object: &Value) -> Result<Value, EngineError>;
    fn create_object(&mut self) -> Value;
    fn create_host_function(&mut self, name: &str, function: HostFunction) -> Value;
    fn call(&mut self, function: &Value, this: &Value, args: &[Value])
        -> Result<Value, EngineError>;
    /// Compile without running.
    fn prepare_script(&mut self, source: &str, url: &str) -> Result<PreparedScript, EngineError>;

    fn instrumentation(&mut self) -> &mut dyn Instrumentation;
}

/// Heap and CPU profiling services.
pub trait Instrumentation {
    fn heap_usage(&mut self) -> HeapUsage;
    fn collect_garbage(&mut self, cause: &str);
    /// Stable id for an object, `None` for primitives.
    fn heap_object_id(&mut self, value: &Value) -> Option<u64>;
    fn object_for_heap_id(&mut self, id: u64) -> Option<Value>;
    fn write_heap_snapshot(&mut self, out: &mut dyn io::Write, capture_numeric_value: bool)
        -> io::Result<()>;
    fn start_tracking_heap_objects(&mut self, callback: HeapStatsCallback);
    fn stop_tracking_heap_objects(&mut self);
    fn start_heap_sampling(&mut self, interval: u64);
    /// Sampling profile as JSON text.
    fn stop_heap_sampling(&mut self) -> String;
    fn start_profiler(&mut self);
    /// CPU profile as JSON text.
    fn stop_profiler(&mut self) -> String;
}
