//! Interpreter and debugger hooks of the scripted engine.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::debugger::{
    BreakpointId, BreakpointInfo, CallFrameInfo, Command, EvalResult, ExceptionDetails,
    LexicalInfo, PauseOnThrowMode, PauseReason, ProgramState, ScriptId, SourceLocation,
    StepMode, VariableInfo,
};
use crate::engine::{
    Engine, EventObserver, HeapStatsCallback, HeapStatsEntry, HeapUsage, HostFunction,
    Instrumentation, PreparedScript,
};
use crate::error::EngineError;
use crate::scripted::heap::{Callable, Heap, HeapObject, GLOBAL_HANDLE, OBJECT_PROTOTYPE_HANDLE};
use crate::scripted::parser::{
    parse_expression, parse_program, BinaryOp, Expr, FunctionDecl, Line, Literal, Program, Stmt,
    UnaryOp,
};
use crate::value::{ObjectKind, Value};

/// Values of the shared async-pause request cell.
pub(crate) const NO_PAUSE_REQUESTED: u8 = 0;
pub(crate) const IMPLICIT_PAUSE_REQUESTED: u8 = 1;
pub(crate) const EXPLICIT_PAUSE_REQUESTED: u8 = 2;

const NATIVE_CONSOLE_METHODS: [&str; 12] = [
    "log", "info", "warn", "error", "debug", "trace", "table", "dir", "group", "groupEnd",
    "assert", "clear",
];

struct LoadedScript {
    name: String,
    program: Arc<Program>,
}

struct Frame {
    function_name: String,
    file_id: ScriptId,
    line: u32,
    column: u32,
    /// `None` for global code.
    locals: Option<Vec<(String, Value)>>,
    this: Value,
}

struct EngineBreakpoint {
    requested: SourceLocation,
    resolved: Option<SourceLocation>,
    condition: Option<String>,
    enabled: bool,
}

enum Flow {
    Normal,
    Return(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resumption {
    Continue,
    Step,
}

/// Single-threaded toy engine implementing the debugger interface.
///
/// Scripts are parsed by [`parse_program`] and executed statement by
/// statement; every statement is a potential pause point.
pub struct ScriptedEngine {
    heap: Heap,
    global_lexical: Vec<(String, Value)>,
    scripts: Vec<LoadedScript>,
    frames: Vec<Frame>,
    breakpoints: BTreeMap<BreakpointId, EngineBreakpoint>,
    next_breakpoint_id: BreakpointId,
    observer: Option<Arc<dyn EventObserver>>,
    pause_on_load: bool,
    attached: bool,
    throw_mode: PauseOnThrowMode,
    pause_request: Arc<AtomicU8>,
    step: Option<(StepMode, usize)>,
    paused: Option<ProgramState>,
    eval_depth: u32,
    prepared: Vec<Arc<Program>>,
    gc_count: u64,
    heap_tracking: Option<HeapStatsCallback>,
    heap_sampling: Option<u64>,
    profiling: bool,
}

impl ScriptedEngine {
    /// Create an engine with a global object and a native `console` whose
    /// output is appended to `console_output`.
    pub fn new(pause_request: Arc<AtomicU8>, console_output: Arc<Mutex<Vec<String>>>) -> Self {
        let mut heap = Heap::default();
        let mut global = HeapObject::plain(Value::Null);
        global.class_name = "global".into();
        heap.alloc(global);
        let proto = heap.alloc(HeapObject::plain(Value::Null));
        if let Ok(global) = heap.get_mut(GLOBAL_HANDLE) {
            global.prototype = Value::Object(proto);
        }

        let mut engine = Self {
            heap,
            global_lexical: Vec::new(),
            scripts: Vec::new(),
            frames: Vec::new(),
            breakpoints: BTreeMap::new(),
            next_breakpoint_id: 1,
            observer: None,
            pause_on_load: false,
            attached: false,
            throw_mode: PauseOnThrowMode::None,
            pause_request,
            step: None,
            paused: None,
            eval_depth: 0,
            prepared: Vec::new(),
            gc_count: 0,
            heap_tracking: None,
            heap_sampling: None,
            profiling: false,
        };
        engine.install_native_console(console_output);
        engine
    }

    fn install_native_console(&mut self, output: Arc<Mutex<Vec<String>>>) {
        let console = self.create_object();
        for method in NATIVE_CONSOLE_METHODS {
            let output = Arc::clone(&output);
            let function: HostFunction = Arc::new(move |_engine, _this, args| {
                let text = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                output
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(format!("{method}: {text}"));
                Ok(Value::Undefined)
            });
            let value = self.create_host_function(method, function);
            // Both handles were just allocated.
            let _ = self.set_property(&console, method, value);
        }
        let global = self.global_value();
        let _ = self.set_property(&global, "console", console);
    }

    /// Whether a debugger client is attached, as last reported by the adapter.
    pub fn debugger_attached(&self) -> bool {
        self.attached
    }

    /// Number of collections requested through instrumentation.
    pub fn gc_count(&self) -> u64 {
        self.gc_count
    }

    pub fn has_event_observer(&self) -> bool {
        self.observer.is_some()
    }

    pub fn is_tracking_heap_objects(&self) -> bool {
        self.heap_tracking.is_some()
    }

    /// Parse and run a script to completion.
    ///
    /// # Errors
    ///
    /// [`EngineError::Syntax`] if the source does not parse and
    /// [`EngineError::Thrown`] if the script throws without catching.
    pub fn run_script(&mut self, source: &str, url: &str) -> Result<Value, EngineError> {
        let program = Arc::new(parse_program(source)?);
        let file_id = self.scripts.len() as ScriptId + 1;
        self.scripts.push(LoadedScript {
            name: url.to_string(),
            program: Arc::clone(&program),
        });
        self.resolve_pending_breakpoints(file_id);
        self.define_functions(file_id, &program)?;

        let (line, column) = program.first_position();
        let depth = self.frames.len();
        self.frames.push(Frame {
            function_name: "global".into(),
            file_id,
            line,
            column,
            locals: None,
            this: self.global_value(),
        });

        if self.pause_on_load {
            self.pause(PauseReason::ScriptLoaded, None);
        }
        let result = self.exec_block(&program.body);
        self.frames.truncate(depth);

        match result {
            Ok(_) => Ok(Value::Undefined),
            Err(e) => {
                tracing::debug!(url, error = %e, "script terminated");
                Err(e)
            }
        }
    }

    /// Deliver a pending async pause while no script is running.
    pub(crate) fn service_async_pause(&mut self) {
        if self.pause_request.load(Ordering::SeqCst) == NO_PAUSE_REQUESTED
            || self.observer.is_none()
            || self.paused.is_some()
        {
            return;
        }
        let depth = self.frames.len();
        self.frames.push(Frame {
            function_name: "(idle)".into(),
            file_id: 0,
            line: 1,
            column: 1,
            locals: None,
            this: self.global_value(),
        });
        let reason = self.requested_pause_reason();
        self.pause(reason, None);
        self.frames.truncate(depth);
    }

    fn requested_pause_reason(&self) -> PauseReason {
        if self.pause_request.load(Ordering::SeqCst) == EXPLICIT_PAUSE_REQUESTED {
            PauseReason::AsyncTriggerExplicit
        } else {
            PauseReason::AsyncTrigger
        }
    }

    fn global_value(&self) -> Value {
        self.heap
            .reference(GLOBAL_HANDLE)
            .map(Value::Object)
            .unwrap_or_default()
    }

    fn object_prototype(&self) -> Value {
        self.heap
            .reference(OBJECT_PROTOTYPE_HANDLE)
            .map(Value::Object)
            .unwrap_or_default()
    }

    fn define_functions(&mut self, file_id: ScriptId, program: &Program) -> Result<(), EngineError> {
        for decl in &program.functions {
            let function = self.alloc_function(
                &decl.name,
                Callable::Declared {
                    file_id,
                    decl: Arc::new(decl.clone()),
                },
            );
            self.heap.set(GLOBAL_HANDLE, &decl.name, function)?;
        }
        Ok(())
    }

    fn alloc_function(&mut self, name: &str, callable: Callable) -> Value {
        let mut object = HeapObject::plain(self.object_prototype());
        object.kind = ObjectKind::Function;
        object.class_name = "Function".into();
        object.label = name.to_string();
        object.callable = Some(callable);
        Value::Object(self.heap.alloc(object))
    }

    // -- pausing ----------------------------------------------------------

    fn pause(&mut self, mut reason: PauseReason, breakpoint: Option<BreakpointId>) -> Resumption {
        let Some(observer) = self.observer.clone() else {
            return Resumption::Continue;
        };
        if self.paused.is_some() || self.eval_depth > 0 {
            return Resumption::Continue;
        }
        self.pause_request.store(NO_PAUSE_REQUESTED, Ordering::SeqCst);
        // An implicit async pause that continues must not cancel a step in
        // progress.
        let interrupted_step = self.step.take();
        let implicit = reason == PauseReason::AsyncTrigger;

        let mut eval_result = None;
        loop {
            self.paused = Some(ProgramState {
                pause_reason: reason,
                stack: self.stack_trace(),
                eval_result: eval_result.take(),
                breakpoint,
            });
            let command = observer.did_pause(self);
            self.paused = None;

            match command {
                Command::Continue => {
                    if implicit {
                        self.step = interrupted_step;
                    }
                    return Resumption::Continue;
                }
                Command::Step(mode) => {
                    self.step = Some((mode, self.frames.len()));
                    return Resumption::Step;
                }
                Command::Eval {
                    expression,
                    frame_index,
                } => {
                    eval_result = Some(self.evaluate_in_frame(&expression, frame_index));
                    reason = PauseReason::EvalComplete;
                }
            }
        }
    }

    fn before_statement(&mut self) {
        if self.observer.is_none() || self.paused.is_some() || self.eval_depth > 0 {
            return;
        }
        if self.pause_request.load(Ordering::SeqCst) != NO_PAUSE_REQUESTED {
            let reason = self.requested_pause_reason();
            if self.pause(reason, None) == Resumption::Step {
                return;
            }
        }
        if let Some((mode, depth)) = self.step {
            let current = self.frames.len();
            let finished = match mode {
                StepMode::Into => true,
                StepMode::Over => current <= depth,
                StepMode::Out => current < depth,
            };
            if finished {
                self.pause(PauseReason::StepFinish, None);
                return;
            }
        }
        if let Some(id) = self.breakpoint_hit() {
            self.pause(PauseReason::Breakpoint, Some(id));
        }
    }

    fn breakpoint_hit(&mut self) -> Option<BreakpointId> {
        let frame = self.frames.last()?;
        let (file_id, line, column) = (frame.file_id, frame.line, frame.column);
        let candidates: Vec<(BreakpointId, Option<String>)> = self
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.enabled)
            .filter(|(_, bp)| {
                bp.resolved.as_ref().is_some_and(|loc| {
                    loc.file_id == file_id
                        && loc.line == line
                        && loc.column.map_or(true, |c| c == column)
                })
            })
            .map(|(id, bp)| (*id, bp.condition.clone()))
            .collect();

        for (id, condition) in candidates {
            let Some(condition) = condition else {
                return Some(id);
            };
            let result = self.evaluate_in_frame(&condition, 0);
            if !result.is_exception() && result.value.is_truthy() {
                return Some(id);
            }
        }
        None
    }

    fn stack_trace(&self) -> Vec<CallFrameInfo> {
        self.frames
            .iter()
            .rev()
            .map(|frame| CallFrameInfo {
                function_name: frame.function_name.clone(),
                location: self.location_of(frame),
            })
            .collect()
    }

    fn location_of(&self, frame: &Frame) -> SourceLocation {
        SourceLocation {
            file_id: frame.file_id,
            file_name: self.script_name(frame.file_id),
            line: frame.line,
            column: Some(frame.column),
        }
    }

    fn script_name(&self, file_id: ScriptId) -> String {
        self.script(file_id)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn script(&self, file_id: ScriptId) -> Option<&LoadedScript> {
        (file_id as usize)
            .checked_sub(1)
            .and_then(|i| self.scripts.get(i))
    }

    /// Index into `self.frames` of frame `frame_index` counted from the top.
    fn frame_slot(&self, frame_index: u32) -> Option<usize> {
        self.frames
            .len()
            .checked_sub(1 + frame_index as usize)
    }

    fn evaluate_in_frame(&mut self, expression: &str, frame_index: u32) -> EvalResult {
        let slot = self.frame_slot(frame_index).or_else(|| self.frame_slot(0));
        let expr = match parse_expression(expression) {
            Ok(expr) => expr,
            Err(e) => {
                let message = e.to_string();
                let error = self.new_error(&format!("SyntaxError: {message}"));
                return EvalResult::thrown(error, self.exception_details(&message));
            }
        };

        self.eval_depth += 1;
        let result = match slot {
            Some(slot) => self.eval(&expr, slot),
            None => self.eval_without_frame(&expr),
        };
        self.eval_depth -= 1;

        match result {
            Ok(value) => EvalResult::value(value),
            Err(EngineError::Thrown(exception)) => {
                EvalResult::thrown(exception.value, exception.details)
            }
            Err(other) => {
                let message = other.to_string();
                let error = self.new_error(&message);
                EvalResult::thrown(error, self.exception_details(&message))
            }
        }
    }

    fn eval_without_frame(&mut self, expr: &Expr) -> Result<Value, EngineError> {
        self.frames.push(Frame {
            function_name: "(eval)".into(),
            file_id: 0,
            line: 1,
            column: 1,
            locals: None,
            this: self.global_value(),
        });
        let slot = self.frames.len() - 1;
        let result = self.eval(expr, slot);
        self.frames.pop();
        result
    }

    // -- exceptions -------------------------------------------------------

    fn exception_details(&self, text: &str) -> ExceptionDetails {
        let location = self
            .frames
            .last()
            .map(|frame| self.location_of(frame))
            .unwrap_or_default();
        ExceptionDetails {
            text: text.to_string(),
            location,
            stack: self.stack_trace(),
        }
    }

    fn new_error(&mut self, message: &str) -> Value {
        let mut object = HeapObject::plain(self.object_prototype());
        object.kind = ObjectKind::Error;
        object.class_name = "Error".into();
        object.label = message.to_string();
        let stack = std::iter::once(if message.is_empty() {
            "Error".to_string()
        } else {
            format!("Error: {message}")
        })
        .chain(self.frames.iter().rev().map(|f| {
            format!(
                "    at {} ({}:{}:{})",
                f.function_name,
                self.script_name(f.file_id),
                f.line,
                f.column
            )
        }))
        .collect::<Vec<_>>()
        .join("\n");
        object.properties = vec![
            ("message".into(), Value::String(message.to_string())),
            ("stack".into(), Value::String(stack)),
        ];
        Value::Object(self.heap.alloc(object))
    }

    /// Throw `value` from the current statement, pausing first when the
    /// throw mode asks for it.
    fn raise(&mut self, value: Value, caught: bool) -> EngineError {
        let text = format!("Uncaught {value}");
        let details = self.exception_details(&text);
        let stop = match self.throw_mode {
            PauseOnThrowMode::None => false,
            PauseOnThrowMode::All => true,
            PauseOnThrowMode::Uncaught => !caught,
        };
        if stop {
            self.pause(PauseReason::Exception, None);
        }
        EngineError::thrown(value, details)
    }

    fn runtime_error(&mut self, message: &str) -> EngineError {
        let error = self.new_error(message);
        self.raise(error, false)
    }

    // -- statements -------------------------------------------------------

    fn exec_block(&mut self, lines: &[Line]) -> Result<Flow, EngineError> {
        for line in lines {
            if let Some(frame) = self.frames.last_mut() {
                frame.line = line.line;
                frame.column = line.column;
            }
            self.before_statement();
            if let Flow::Return(value) = self.exec_statement(&line.stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(&mut self, stmt: &Stmt) -> Result<Flow, EngineError> {
        let slot = self.frames.len().saturating_sub(1);
        match stmt {
            Stmt::Debugger => {
                self.pause(PauseReason::DebuggerStatement, None);
            }
            Stmt::Declare {
                name,
                init,
                lexical,
            } => {
                let value = self.eval(init, slot)?;
                self.declare(name, value, *lexical)?;
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value, slot)?;
                self.assign(slot, name, value)?;
            }
            Stmt::Throw { value, caught } => {
                let value = self.eval(value, slot)?;
                let error = self.raise(value, *caught);
                if !*caught {
                    return Err(error);
                }
            }
            Stmt::Return(value) => return Ok(Flow::Return(self.eval(value, slot)?)),
            Stmt::Expr(expr) => {
                self.eval(expr, slot)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn declare(&mut self, name: &str, value: Value, lexical: bool) -> Result<(), EngineError> {
        if let Some(locals) = self.frames.last_mut().and_then(|f| f.locals.as_mut()) {
            upsert(locals, name, value);
        } else if lexical {
            upsert(&mut self.global_lexical, name, value);
        } else {
            self.heap.set(GLOBAL_HANDLE, name, value)?;
        }
        Ok(())
    }

    fn assign(&mut self, slot: usize, name: &str, value: Value) -> Result<(), EngineError> {
        if let Some(locals) = self.frames.get_mut(slot).and_then(|f| f.locals.as_mut()) {
            if let Some(entry) = locals.iter_mut().find(|(k, _)| k == name) {
                entry.1 = value;
                return Ok(());
            }
        }
        if let Some(entry) = self.global_lexical.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value;
            return Ok(());
        }
        self.heap.set(GLOBAL_HANDLE, name, value)
    }

    fn lookup(&mut self, slot: usize, name: &str) -> Result<Value, EngineError> {
        if let Some(locals) = self.frames.get(slot).and_then(|f| f.locals.as_ref()) {
            if let Some((_, v)) = locals.iter().find(|(k, _)| k == name) {
                return Ok(v.clone());
            }
        }
        if let Some((_, v)) = self.global_lexical.iter().find(|(k, _)| k == name) {
            return Ok(v.clone());
        }
        match self.heap.lookup(GLOBAL_HANDLE, name)? {
            Some(v) => Ok(v),
            None => Err(self.runtime_error(&format!("Property '{name}' doesn't exist"))),
        }
    }

    // -- expressions ------------------------------------------------------

    fn eval(&mut self, expr: &Expr, slot: usize) -> Result<Value, EngineError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::String(s.clone()),
                Literal::BigInt(d) => Value::BigInt(d.clone()),
            }),
            Expr::Ident(name) => self.lookup(slot, name),
            Expr::This => Ok(self
                .frames
                .get(slot)
                .map(|f| f.this.clone())
                .unwrap_or_default()),
            Expr::Member(object, name) => {
                let object = self.eval(object, slot)?;
                self.read_property(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object, slot)?;
                let key = self.eval(index, slot)?.to_string();
                self.read_property(&object, &key)
            }
            Expr::Call(callee, args) => {
                let (function, this) = match callee.as_ref() {
                    Expr::Member(object, name) => {
                        let object = self.eval(object, slot)?;
                        (self.read_property(&object, name)?, object)
                    }
                    other => (self.eval(other, slot)?, self.global_value()),
                };
                let args = args
                    .iter()
                    .map(|a| self.eval(a, slot))
                    .collect::<Result<Vec<_>, _>>()?;
                self.invoke(&function, this, &args)
            }
            Expr::Object(fields) => {
                let mut object = HeapObject::plain(self.object_prototype());
                for (key, value) in fields {
                    let value = self.eval(value, slot)?;
                    object.properties.push((key.clone(), value));
                }
                Ok(Value::Object(self.heap.alloc(object)))
            }
            Expr::Array(items) => {
                let mut object = HeapObject::plain(self.object_prototype());
                object.kind = ObjectKind::Array;
                object.class_name = "Array".into();
                for (i, item) in items.iter().enumerate() {
                    let value = self.eval(item, slot)?;
                    object.properties.push((i.to_string(), value));
                }
                object
                    .properties
                    .push(("length".into(), Value::Number(items.len() as f64)));
                Ok(Value::Object(self.heap.alloc(object)))
            }
            Expr::NewError(args) => {
                let message = match args.first() {
                    Some(arg) => self.eval(arg, slot)?.to_string(),
                    None => String::new(),
                };
                Ok(self.new_error(&message))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, slot)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-to_number(&value)),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, slot)?;
                let rhs = self.eval(rhs, slot)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expr::Function { name, params, body } => Ok(self.alloc_function(
                name.as_deref().unwrap_or(""),
                Callable::Literal {
                    params: params.clone(),
                    body: Arc::new((**body).clone()),
                },
            )),
            Expr::Throw(value) => {
                let value = self.eval(value, slot)?;
                Err(self.raise(value, false))
            }
        }
    }

    fn read_property(&mut self, object: &Value, name: &str) -> Result<Value, EngineError> {
        match object {
            Value::Object(obj) => Ok(self.heap.lookup(obj.handle(), name)?.unwrap_or_default()),
            Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Undefined | Value::Null => Err(self.runtime_error(&format!(
                "Cannot read property '{name}' of {object}"
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    fn invoke(&mut self, function: &Value, this: Value, args: &[Value]) -> Result<Value, EngineError> {
        let callable = function
            .as_object()
            .filter(|obj| obj.kind() == ObjectKind::Function)
            .and_then(|obj| self.heap.get(obj.handle()).ok())
            .and_then(|object| object.callable.clone().map(|c| (c, object.label.clone())));
        let Some((callable, label)) = callable else {
            return Err(self.runtime_error(&format!("{function} is not a function")));
        };

        match callable {
            Callable::Host(host) => host(self, &this, args),
            Callable::Literal { params, body } => {
                let (file_id, line, column) = self
                    .frames
                    .last()
                    .map(|f| (f.file_id, f.line, f.column))
                    .unwrap_or((0, 1, 1));
                self.frames.push(Frame {
                    function_name: if label.is_empty() {
                        "(anonymous)".into()
                    } else {
                        label
                    },
                    file_id,
                    line,
                    column,
                    locals: Some(bind(&params, args)),
                    this,
                });
                let slot = self.frames.len() - 1;
                let result = self.eval(&body, slot);
                self.frames.pop();
                result
            }
            Callable::Declared { file_id, decl } => self.call_declared(file_id, &decl, this, args),
        }
    }

    fn call_declared(
        &mut self,
        file_id: ScriptId,
        decl: &FunctionDecl,
        this: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let (line, column) = decl
            .body
            .first()
            .map(|l| (l.line, l.column))
            .unwrap_or((1, 1));
        let depth = self.frames.len();
        self.frames.push(Frame {
            function_name: decl.name.clone(),
            file_id,
            line,
            column,
            locals: Some(bind(&decl.params, args)),
            this,
        });
        let result = self.exec_block(&decl.body);
        self.frames.truncate(depth);
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Undefined),
        }
    }

    // -- breakpoints ------------------------------------------------------

    fn resolve(&self, requested: &SourceLocation) -> Option<SourceLocation> {
        let file_id = if requested.file_id != 0 {
            requested.file_id
        } else {
            let index = self
                .scripts
                .iter()
                .rposition(|s| !requested.file_name.is_empty() && s.name == requested.file_name)?;
            index as ScriptId + 1
        };
        let script = self.script(file_id)?;
        let program = &script.program;

        let statements = program
            .body
            .iter()
            .chain(program.functions.iter().flat_map(|f| f.body.iter()));
        let (line, column) = statements
            .filter(|l| {
                l.line > requested.line
                    || (l.line == requested.line
                        && requested.column.map_or(true, |c| l.column >= c))
            })
            .map(|l| (l.line, l.column))
            .min()?;

        Some(SourceLocation {
            file_id,
            file_name: script.name.clone(),
            line,
            column: Some(column),
        })
    }

    fn resolve_pending_breakpoints(&mut self, file_id: ScriptId) {
        let name = self.script_name(file_id);
        let pending: Vec<(BreakpointId, SourceLocation)> = self
            .breakpoints
            .iter()
            .filter(|(_, bp)| bp.resolved.is_none() && bp.requested.file_name == name)
            .map(|(id, bp)| (*id, bp.requested.clone()))
            .collect();
        for (id, requested) in pending {
            let resolved = self.resolve(&requested);
            if let Some(bp) = self.breakpoints.get_mut(&id) {
                bp.resolved = resolved;
            }
        }
    }
}

fn upsert(bindings: &mut Vec<(String, Value)>, name: &str, value: Value) {
    match bindings.iter_mut().find(|(k, _)| k == name) {
        Some(entry) => entry.1 = value,
        None => bindings.push((name.to_string(), value)),
    }
}

fn bind(params: &[String], args: &[Value]) -> Vec<(String, Value)> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), args.get(i).cloned().unwrap_or_default()))
        .collect()
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn strict_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a.handle() == b.handle(),
        (a, b) => a == b,
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let numeric = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(lhs), to_number(rhs)));
    let compare = |f: fn(f64, f64) -> bool| Value::Bool(f(to_number(lhs), to_number(rhs)));
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{lhs}{rhs}")),
            _ => numeric(|a, b| a + b),
        },
        BinaryOp::Sub => numeric(|a, b| a - b),
        BinaryOp::Mul => numeric(|a, b| a * b),
        BinaryOp::Div => numeric(|a, b| a / b),
        BinaryOp::Eq => Value::Bool(strict_equals(lhs, rhs)),
        BinaryOp::NotEq => Value::Bool(!strict_equals(lhs, rhs)),
        BinaryOp::Lt => compare(|a, b| a < b),
        BinaryOp::Gt => compare(|a, b| a > b),
        BinaryOp::LtEq => compare(|a, b| a <= b),
        BinaryOp::GtEq => compare(|a, b| a >= b),
    }
}

fn now_since_epoch() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

impl Engine for ScriptedEngine {
    fn set_event_observer(&mut self, observer: Option<Arc<dyn EventObserver>>) {
        self.observer = observer;
    }

    fn set_should_pause_on_script_load(&mut self, pause: bool) {
        self.pause_on_load = pause;
    }

    fn set_debugger_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    fn program_state(&self) -> ProgramState {
        self.paused.clone().unwrap_or_else(|| ProgramState {
            pause_reason: PauseReason::AsyncTrigger,
            stack: self.stack_trace(),
            eval_result: None,
            breakpoint: None,
        })
    }

    fn lexical_info(&self, frame: u32) -> LexicalInfo {
        let locals = self
            .frame_slot(frame)
            .and_then(|slot| self.frames[slot].locals.as_ref())
            .map(|l| l.len() as u32);
        let global = self.global_lexical.len() as u32;
        match locals {
            Some(count) => LexicalInfo::new(vec![count, global]),
            None => LexicalInfo::new(vec![global]),
        }
    }

    fn variable_info(&self, frame: u32, scope: u32, index: u32) -> Option<VariableInfo> {
        let locals = self
            .frame_slot(frame)
            .and_then(|slot| self.frames[slot].locals.as_ref());
        let bindings = match (locals, scope) {
            (Some(locals), 0) => locals,
            (Some(_), 1) | (None, 0) => &self.global_lexical,
            _ => return None,
        };
        bindings.get(index as usize).map(|(name, value)| VariableInfo {
            name: name.clone(),
            value: value.clone(),
        })
    }

    fn this_info(&self, frame: u32) -> Value {
        self.frame_slot(frame)
            .map(|slot| self.frames[slot].this.clone())
            .unwrap_or_default()
    }

    fn source_mapping_url(&self, file_id: ScriptId) -> Option<String> {
        self.script(file_id)
            .and_then(|s| s.program.source_map_url.clone())
    }

    fn set_breakpoint(&mut self, location: SourceLocation) -> Option<BreakpointId> {
        if location.file_id == 0 && location.file_name.is_empty() {
            return None;
        }
        if location.file_id != 0 && self.script(location.file_id).is_none() {
            return None;
        }
        let id = self.next_breakpoint_id;
        self.next_breakpoint_id += 1;
        let resolved = self.resolve(&location);
        self.breakpoints.insert(
            id,
            EngineBreakpoint {
                requested: location,
                resolved,
                condition: None,
                enabled: true,
            },
        );
        Some(id)
    }

    fn set_breakpoint_condition(&mut self, id: BreakpointId, condition: &str) {
        if let Some(bp) = self.breakpoints.get_mut(&id) {
            bp.condition = (!condition.is_empty()).then(|| condition.to_string());
        }
    }

    fn breakpoint_info(&self, id: BreakpointId) -> Option<BreakpointInfo> {
        self.breakpoints.get(&id).map(|bp| BreakpointInfo {
            id,
            enabled: bp.enabled,
            resolved: bp.resolved.is_some(),
            requested_location: bp.requested.clone(),
            resolved_location: bp.resolved.clone(),
            condition: bp.condition.clone(),
        })
    }

    fn delete_breakpoint(&mut self, id: BreakpointId) {
        self.breakpoints.remove(&id);
    }

    fn delete_all_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn set_pause_on_throw_mode(&mut self, mode: PauseOnThrowMode) {
        self.throw_mode = mode;
    }

    fn global(&mut self) -> Value {
        self.global_value()
    }

    fn get_property(&mut self, object: &Value, name: &str) -> Result<Value, EngineError> {
        match object {
            Value::Object(obj) => Ok(self.heap.lookup(obj.handle(), name)?.unwrap_or_default()),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    fn set_property(&mut self, object: &Value, name: &str, value: Value) -> Result<(), EngineError> {
        match object {
            Value::Object(obj) => self.heap.set(obj.handle(), name, value),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    fn own_property_names(&mut self, object: &Value) -> Result<Vec<String>, EngineError> {
        match object {
            Value::Object(obj) => Ok(self
                .heap
                .get(obj.handle())?
                .properties
                .iter()
                .map(|(k, _)| k.clone())
                .collect()),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    fn prototype_of(&mut self, object: &Value) -> Result<Value, EngineError> {
        match object {
            Value::Object(obj) => match &self.heap.get(obj.handle())?.prototype {
                Value::Object(proto) => Ok(Value::Object(self.heap.reference(proto.handle())?)),
                other => Ok(other.clone()),
            },
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    fn create_object(&mut self) -> Value {
        let object = HeapObject::plain(self.object_prototype());
        Value::Object(self.heap.alloc(object))
    }

    fn create_host_function(&mut self, name: &str, function: HostFunction) -> Value {
        self.alloc_function(name, Callable::Host(function))
    }

    fn call(&mut self, function: &Value, this: &Value, args: &[Value]) -> Result<Value, EngineError> {
        self.invoke(function, this.clone(), args)
    }

    fn prepare_script(&mut self, source: &str, url: &str) -> Result<PreparedScript, EngineError> {
        let program = parse_program(source)?;
        tracing::debug!(url, "prepared script");
        self.prepared.push(Arc::new(program));
        Ok(PreparedScript(self.prepared.len() as u64 - 1))
    }

    fn instrumentation(&mut self) -> &mut dyn Instrumentation {
        self
    }
}

impl ScriptedEngine {
    fn heap_stats(&self) -> (u64, Vec<HeapStatsEntry>) {
        let count = self.heap.len() as u64;
        (
            count,
            vec![HeapStatsEntry {
                fragment_index: 0,
                count,
                size: count * 64,
            }],
        )
    }
}

impl Instrumentation for ScriptedEngine {
    fn heap_usage(&mut self) -> HeapUsage {
        let used = self.heap.len() as u64 * 64;
        HeapUsage {
            used_size: used,
            total_size: used + (1 << 20),
        }
    }

    fn collect_garbage(&mut self, cause: &str) {
        tracing::debug!(cause, "collect garbage");
        self.gc_count += 1;
    }

    fn heap_object_id(&mut self, value: &Value) -> Option<u64> {
        value.as_object().map(|obj| obj.handle() + 1)
    }

    fn object_for_heap_id(&mut self, id: u64) -> Option<Value> {
        let handle = id.checked_sub(1)?;
        self.heap.reference(handle).ok().map(Value::Object)
    }

    fn write_heap_snapshot(
        &mut self,
        out: &mut dyn io::Write,
        capture_numeric_value: bool,
    ) -> io::Result<()> {
        let mut strings: Vec<String> = Vec::new();
        let mut nodes: Vec<u64> = Vec::new();
        for (handle, object) in self.heap.iter() {
            strings.push(object.class_name.clone());
            nodes.extend([
                object.kind as u64,
                strings.len() as u64 - 1,
                handle + 1,
                64,
                object.properties.len() as u64,
            ]);
        }
        let snapshot = json!({
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "capture_numeric_value": capture_numeric_value,
                },
                "node_count": self.heap.len(),
            },
            "nodes": nodes,
            "strings": strings,
        });
        serde_json::to_writer(&mut *out, &snapshot)?;
        out.flush()
    }

    fn start_tracking_heap_objects(&mut self, mut callback: HeapStatsCallback) {
        let (last_id, stats) = self.heap_stats();
        callback(last_id, now_since_epoch(), &stats);
        self.heap_tracking = Some(callback);
    }

    fn stop_tracking_heap_objects(&mut self) {
        let (last_id, stats) = self.heap_stats();
        if let Some(mut callback) = self.heap_tracking.take() {
            callback(last_id, now_since_epoch(), &stats);
        }
    }

    fn start_heap_sampling(&mut self, interval: u64) {
        self.heap_sampling = Some(interval);
    }

    fn stop_heap_sampling(&mut self) -> String {
        match self.heap_sampling.take() {
            Some(interval) => json!({
                "head": {
                    "callFrame": {
                        "functionName": "(root)",
                        "scriptId": "0",
                        "url": "",
                        "lineNumber": -1,
                        "columnNumber": -1,
                    },
                    "selfSize": 0,
                    "id": 1,
                    "children": [],
                },
                "samples": [],
                "samplingInterval": interval,
            })
            .to_string(),
            None => "heap sampling was not started".to_string(),
        }
    }

    fn start_profiler(&mut self) {
        self.profiling = true;
    }

    fn stop_profiler(&mut self) -> String {
        if !std::mem::take(&mut self.profiling) {
            return "profiler was not started".to_string();
        }
        json!({
            "nodes": [{
                "id": 1,
                "callFrame": {
                    "functionName": "(root)",
                    "scriptId": "0",
                    "url": "",
                    "lineNumber": -1,
                    "columnNumber": -1,
                },
                "hitCount": 0,
                "children": [],
            }],
            "startTime": 0,
            "endTime": 0,
            "samples": [],
            "timeDeltas": [],
        })
        .to_string()
    }
}
