//! The pause callback.
//!
//! Every client intent that changes what the engine does is applied
//! here, on the engine thread, while the engine is halted. The callback
//! drains the queues in a fixed order, decides between continuing,
//! stepping and evaluating, and parks the engine thread while the client
//! inspects a paused program.

use lookout_engine::{
    Command, Engine, EvalResult, PauseReason, PreparedScript, StepMode, Value,
};
use lookout_engine::PauseOnThrowMode;
use lookout_protocol::{
    ConsoleApiCalled, EvaluateResult, Paused, PausedReason, RemoteObject, Response,
    ScriptParsed, EXECUTION_CONTEXT_ID, RESUMED_METHOD,
};

use crate::console::ConsoleMessage;
use crate::convert::{self, ObjectOptions};
use crate::error::AdapterError;
use crate::handler::{detach_engine, Shared};
use crate::lock;
use crate::queues::{Attachment, Execution, PendingEval};
use crate::remote_objects::{BACKTRACE_GROUP, CONSOLE_GROUP};
use crate::scripts::ScriptTable;
use crate::virtual_breakpoints::BEFORE_SCRIPT_WITH_SOURCE_MAP;

/// Adapter state only touched on the engine thread.
pub(crate) struct PauseState {
    pub execution: Execution,
    pub scripts: ScriptTable,
    /// Scripts kept by `Runtime.compileScript` with `persistScript`.
    pub prepared_scripts: Vec<PreparedScript>,
}

impl PauseState {
    pub fn new() -> Self {
        Self {
            execution: Execution::Running,
            scripts: ScriptTable::new(),
            prepared_scripts: Vec::new(),
        }
    }
}

/// Everything a queued action may touch while the engine is halted.
pub struct PauseContext<'a> {
    pub(crate) engine: &'a mut dyn Engine,
    pub(crate) state: &'a mut PauseState,
    pub(crate) shared: &'a Shared,
}

impl PauseContext<'_> {
    pub(crate) fn remote_object(
        &mut self,
        value: &Value,
        group: &str,
        options: ObjectOptions,
    ) -> RemoteObject {
        convert::remote_object(self.engine, &self.shared.objects, value, group, options)
    }

    /// Value behind a remote object id.
    pub(crate) fn lookup_value(&self, object_id: &str) -> Result<Value, AdapterError> {
        lock(&self.shared.objects)
            .get_value(object_id)
            .cloned()
            .ok_or(AdapterError::ObjectNotAvailable)
    }

    fn send_paused(&mut self, reason: PausedReason, hit_breakpoints: Option<Vec<String>>) {
        let stack = self.engine.program_state().stack;
        let call_frames = convert::call_frames(self.engine, &self.shared.objects, &stack);
        tracing::debug!(?reason, frames = call_frames.len(), "paused");
        self.shared.notify(
            Paused::METHOD,
            &Paused {
                call_frames,
                reason,
                data: None,
                hit_breakpoints,
            },
        );
    }

    fn send_resumed(&mut self) {
        lock(&self.shared.objects).release_object_group(BACKTRACE_GROUP);
        self.shared.notify_empty(RESUMED_METHOD);
    }

    // -- queue processing -------------------------------------------------

    fn process_attachments(&mut self) {
        while let Some((id, attachment)) = self.shared.queues.with(|q| q.attachments.pop_front()) {
            self.shared.set_attachment(attachment);
            self.shared.respond_ok(id);
            match attachment {
                Attachment::Enabled => {
                    tracing::info!("debugger enabled");
                    self.engine.set_debugger_attached(true);
                    self.state.scripts.reset_notified();
                    self.flush_scripts();
                    if self.state.execution == Execution::Paused {
                        self.send_paused(PausedReason::Other, None);
                    }
                }
                Attachment::Disabled => {
                    tracing::info!("debugger disabled");
                    self.engine.set_debugger_attached(false);
                    self.state.scripts.reset_notified();
                    self.engine.delete_all_breakpoints();
                    self.engine.set_pause_on_throw_mode(PauseOnThrowMode::None);
                    self.state.execution = Execution::Running;
                }
                Attachment::None => {}
            }
        }
    }

    fn record_loaded_script(&mut self) {
        let Some(top) = self.engine.program_state().stack.into_iter().next() else {
            return;
        };
        let file_id = top.location.file_id;
        let source_map_url = self.engine.source_mapping_url(file_id);
        if self
            .state
            .scripts
            .record(file_id, &top.location.file_name, source_map_url)
        {
            tracing::debug!(file_id, url = %top.location.file_name, "script loaded");
        }
    }

    fn flush_scripts(&mut self) {
        if self.shared.attachment() != Attachment::Enabled {
            return;
        }
        for script in self.state.scripts.take_unnotified() {
            self.shared.notify(
                ScriptParsed::METHOD,
                &ScriptParsed {
                    script_id: script.file_id.to_string(),
                    url: script.file_name,
                    start_line: 0,
                    start_column: 0,
                    end_line: 0,
                    end_column: 0,
                    execution_context_id: EXECUTION_CONTEXT_ID,
                    hash: String::new(),
                    source_map_url: script.source_map_url,
                },
            );
        }
    }

    fn top_script_has_source_map(&self) -> bool {
        self.engine
            .program_state()
            .top_frame()
            .and_then(|frame| self.state.scripts.get(frame.location.file_id))
            .is_some_and(|script| script.source_map_url.is_some())
    }

    /// Apply queued execution changes, then let the pause reason
    /// override them. `reason` is `None` when woken without a new pause.
    fn process_executions(&mut self, reason: Option<PauseReason>) {
        let previous = self.state.execution;
        while let Some((id, execution)) = self.shared.queues.with(|q| q.executions.pop_front()) {
            self.shared.respond_ok(id);
            self.state.execution = execution;
        }

        let enabled = self.shared.attachment() == Attachment::Enabled;
        match reason {
            Some(PauseReason::DebuggerStatement | PauseReason::StepFinish) => {
                self.state.execution = Execution::Paused;
            }
            Some(PauseReason::Breakpoint) => {
                let active = self
                    .shared
                    .breakpoints_active
                    .load(std::sync::atomic::Ordering::SeqCst);
                if !active || self.shared.attachment() == Attachment::Disabled {
                    tracing::debug!("ignoring breakpoint hit");
                    self.state.execution = Execution::Running;
                    return;
                }
                self.state.execution = Execution::Paused;
            }
            Some(PauseReason::ScriptLoaded) => {
                let awaiting = self.shared.queues.with(|q| q.awaiting_debugger_on_start);
                let virtual_hit = lock(&self.shared.virtual_breakpoints)
                    .has(BEFORE_SCRIPT_WITH_SOURCE_MAP)
                    && self.top_script_has_source_map();
                if awaiting || virtual_hit {
                    self.state.execution = Execution::Paused;
                    if enabled {
                        let hit = lock(&self.shared.virtual_breakpoints)
                            .ids(BEFORE_SCRIPT_WITH_SOURCE_MAP);
                        self.send_paused(PausedReason::Other, Some(hit));
                    }
                    return;
                }
            }
            Some(PauseReason::Exception) => {
                self.state.execution = Execution::Paused;
                if enabled {
                    self.send_paused(PausedReason::Exception, None);
                }
                return;
            }
            _ => {}
        }

        if previous != self.state.execution && enabled {
            match self.state.execution {
                Execution::Paused => self.send_paused(PausedReason::Other, None),
                Execution::Running => {
                    self.shared
                        .queues
                        .with(|q| q.awaiting_debugger_on_start = false);
                    self.send_resumed();
                }
            }
        }
    }

    fn process_funcs(&mut self) {
        while let Some(func) = self.shared.queues.with(|q| q.funcs.pop_front()) {
            func(self);
        }
    }

    fn complete_eval(&mut self, raw: Option<EvalResult>) {
        let Some(eval) = self.shared.queues.with(|q| q.evals.pop_front()) else {
            tracing::error!("evaluation completed with no pending evaluation");
            debug_assert!(false, "evaluation completed with no pending evaluation");
            return;
        };
        let raw = raw.unwrap_or_else(|| EvalResult::value(Value::Undefined));
        let PendingEval {
            id,
            object_group,
            options,
            on_complete,
            ..
        } = eval;

        let result = match on_complete {
            Some(on_complete) if !raw.is_exception() => on_complete(self, raw),
            _ => Ok(raw),
        };
        let response = match result {
            Ok(result) => {
                let body = self.evaluate_result(&result, &object_group, options);
                Response::with_result(id, &body)
            }
            Err(err) => err.to_response(id),
        };
        self.shared.respond(response);
    }

    pub(crate) fn evaluate_result(
        &mut self,
        result: &EvalResult,
        group: &str,
        options: ObjectOptions,
    ) -> EvaluateResult {
        let remote = self.remote_object(&result.value, group, options);
        let exception_details = result.exception.as_ref().map(|details| {
            convert::exception_details(
                self.engine,
                &self.shared.objects,
                details,
                &result.value,
                group,
            )
        });
        EvaluateResult {
            result: remote,
            exception_details,
        }
    }

    fn front_eval_command(&self) -> Option<Command> {
        self.shared.queues.with(|q| {
            q.evals.front().map(|eval| Command::Eval {
                expression: eval.expression.clone(),
                frame_index: eval.frame_index,
            })
        })
    }

    /// Park the engine thread until the client asks it to move on.
    fn wait_for_command(&mut self) -> Command {
        loop {
            self.process_attachments();
            self.process_executions(None);
            self.process_funcs();

            if let Some((id, mode)) = self.shared.queues.with(|q| q.steps.pop_front()) {
                self.shared.respond_ok(id);
                self.state.execution = Execution::Running;
                self.send_resumed();
                return Command::Step(mode);
            }
            if self.state.execution == Execution::Running {
                let stale: Vec<i64> = self
                    .shared
                    .queues
                    .with(|q| q.evals.drain(..).map(|eval| eval.id).collect());
                for id in stale {
                    self.shared
                        .respond_error(id, &AdapterError::EvaluationAborted);
                }
                return Command::Continue;
            }
            if let Some(command) = self.front_eval_command() {
                return command;
            }
            if !self.shared.queues.wait_for_work() {
                tracing::debug!("handler dropped while paused, continuing");
                detach_engine(self.engine, &self.shared.heap_tracking);
                return Command::Continue;
            }
        }
    }
}

fn step_name(mode: StepMode) -> &'static str {
    match mode {
        StepMode::Into => "into",
        StepMode::Over => "over",
        StepMode::Out => "out",
    }
}

impl Shared {
    /// The pause callback proper.
    pub(crate) fn did_pause(&self, engine: &mut dyn Engine) -> Command {
        if self.queues.with(|q| q.handler_dropped) {
            detach_engine(engine, &self.heap_tracking);
            return Command::Continue;
        }
        let mut state = lock(&self.pause);
        let program = engine.program_state();
        let reason = program.pause_reason;
        tracing::debug!(?reason, breakpoint = ?program.breakpoint, "did pause");

        let mut ctx = PauseContext {
            engine,
            state: &mut *state,
            shared: self,
        };

        ctx.process_attachments();
        if reason == PauseReason::ScriptLoaded {
            ctx.record_loaded_script();
        }
        ctx.flush_scripts();
        ctx.process_executions(Some(reason));
        ctx.process_funcs();
        if reason == PauseReason::EvalComplete {
            ctx.complete_eval(program.eval_result);
        }

        if reason != PauseReason::ScriptLoaded {
            if let Some(command) = ctx.front_eval_command() {
                return command;
            }
        }
        if ctx.state.execution == Execution::Running {
            return Command::Continue;
        }
        let command = ctx.wait_for_command();
        if let Command::Step(mode) = &command {
            tracing::debug!(mode = step_name(*mode), "stepping");
        }
        command
    }

    /// Emit `Runtime.consoleAPICalled` for `message`.
    pub(crate) fn send_console_message(&self, engine: &mut dyn Engine, message: ConsoleMessage) {
        let options = ObjectOptions {
            by_value: false,
            generate_preview: true,
        };
        let args = message
            .args
            .iter()
            .map(|arg| convert::remote_object(engine, &self.objects, arg, CONSOLE_GROUP, options))
            .collect();
        self.notify(
            ConsoleApiCalled::METHOD,
            &ConsoleApiCalled {
                call_type: message.call_type,
                args,
                execution_context_id: EXECUTION_CONTEXT_ID,
                timestamp: message.timestamp,
            },
        );
    }
}
