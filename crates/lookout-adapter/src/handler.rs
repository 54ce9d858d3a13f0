//! The adapter object: connection management and request dispatch.
//!
//! [`CdpHandler`] is created on the engine thread and may then be used
//! from any thread. Requests that only touch adapter state are answered
//! immediately; everything else is queued for the engine thread and
//! answered from the pause callback.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lookout_engine::{AsyncPauseKind, Command, Engine, EventObserver, RuntimeHandle, StepMode};
use lookout_protocol::{parse_request, Notification, ProtocolError, RequestKind, Response};
use serde::Serialize;

use crate::console::{install_console, ConsoleBuffer, ConsoleHook, ConsoleMessage};
use crate::error::AdapterError;
use crate::lock;
use crate::pause::{PauseContext, PauseState};
use crate::queues::{Attachment, Execution, PendingEval, PendingQueues};
use crate::remote_objects::RemoteObjectsTable;
use crate::virtual_breakpoints::VirtualBreakpoints;

/// Receives every outbound message as JSON text.
pub type MessageCallback = Box<dyn Fn(String) + Send + Sync>;

/// Invoked once when the callbacks are unregistered.
pub type UnregisterCallback = Box<dyn FnOnce() + Send>;

/// Tunables of a [`CdpHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    /// Name of the execution context shown to the client.
    pub title: String,
    /// Hold the first script at load until the client resumes it.
    pub wait_for_debugger: bool,
    pub console_buffer_capacity: usize,
    /// Bytes per `HeapProfiler.addHeapSnapshotChunk` notification.
    pub heap_snapshot_chunk_size: usize,
    /// Default `HeapProfiler.startSampling` interval in bytes.
    pub heap_sampling_interval: u64,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            title: "lookout".to_string(),
            wait_for_debugger: false,
            console_buffer_capacity: 1000,
            heap_snapshot_chunk_size: 100 * 1024,
            heap_sampling_interval: 32 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Connection {
    on_message: Option<Arc<dyn Fn(String) + Send + Sync>>,
    on_unregister: Option<UnregisterCallback>,
}

pub(crate) struct ConsoleState {
    pub runtime_enabled: bool,
    pub buffer: ConsoleBuffer,
}

const ATTACHMENT_NONE: u8 = 0;
const ATTACHMENT_ENABLED: u8 = 1;
const ATTACHMENT_DISABLED: u8 = 2;

/// State reachable from client threads, the pause callback and the
/// console hook.
///
/// No lock is held across an engine call, except `pause`, which the pause
/// callback holds for its whole run. The console hook never takes `pause`.
pub(crate) struct Shared {
    pub weak_self: Weak<Shared>,
    pub options: AdapterOptions,
    runtime: Arc<dyn RuntimeHandle>,
    pub queues: PendingQueues,
    connection: Mutex<Connection>,
    pub virtual_breakpoints: Mutex<VirtualBreakpoints>,
    pub breakpoints_active: AtomicBool,
    attachment: AtomicU8,
    pub console: Mutex<ConsoleState>,
    pub objects: Mutex<RemoteObjectsTable>,
    pub pause: Mutex<PauseState>,
    /// Set while `HeapProfiler.startTrackingHeapObjects` is in effect.
    /// Shared with the pause observer, which outlives this struct.
    pub heap_tracking: Arc<AtomicBool>,
}

impl Shared {
    pub fn attachment(&self) -> Attachment {
        match self.attachment.load(Ordering::SeqCst) {
            ATTACHMENT_ENABLED => Attachment::Enabled,
            ATTACHMENT_DISABLED => Attachment::Disabled,
            _ => Attachment::None,
        }
    }

    pub fn set_attachment(&self, attachment: Attachment) {
        let raw = match attachment {
            Attachment::None => ATTACHMENT_NONE,
            Attachment::Enabled => ATTACHMENT_ENABLED,
            Attachment::Disabled => ATTACHMENT_DISABLED,
        };
        self.attachment.store(raw, Ordering::SeqCst);
    }

    // -- outbound ---------------------------------------------------------

    fn send(&self, message: String) {
        let callback = lock(&self.connection).on_message.clone();
        match callback {
            Some(callback) => callback(message),
            None => tracing::trace!("no client connected, dropping message"),
        }
    }

    pub fn respond(&self, response: Response) {
        if let Some(error) = &response.error {
            tracing::debug!(id = response.id, code = error.code, message = %error.message, "error response");
        }
        self.send(response.to_json());
    }

    pub fn respond_ok(&self, id: i64) {
        self.respond(Response::ok(id));
    }

    pub fn respond_error(&self, id: i64, error: &AdapterError) {
        self.respond(error.to_response(id));
    }

    pub fn notify<T: Serialize>(&self, method: &str, params: &T) {
        self.send(Notification::new(method, params).to_json());
    }

    pub fn notify_empty(&self, method: &str) {
        self.send(Notification::empty(method).to_json());
    }

    // -- engine thread handoff --------------------------------------------

    fn trigger(&self, kind: AsyncPauseKind) {
        self.runtime.trigger_async_pause(kind);
        self.runtime.tickle();
    }

    /// Run `f` on the engine thread at the next pause.
    pub fn enqueue_func(&self, f: impl FnOnce(&mut PauseContext<'_>) + Send + 'static) {
        self.queues.push(|q| q.funcs.push_back(Box::new(f)));
        self.trigger(AsyncPauseKind::Implicit);
    }

    /// Answer request `id` with whatever `f` produces on the engine thread.
    pub fn enqueue_request<F>(&self, id: i64, f: F)
    where
        F: FnOnce(&mut PauseContext<'_>) -> Result<Response, AdapterError> + Send + 'static,
    {
        self.enqueue_func(move |ctx| {
            let response = f(ctx).unwrap_or_else(|err| err.to_response(id));
            ctx.shared.respond(response);
        });
    }

    pub fn enqueue_eval(&self, eval: PendingEval) {
        self.queues.push(|q| q.evals.push_back(eval));
        self.trigger(AsyncPauseKind::Implicit);
    }

    pub fn enqueue_attachment(&self, id: i64, attachment: Attachment) {
        self.queues.push(|q| q.attachments.push_back((id, attachment)));
        self.trigger(AsyncPauseKind::Implicit);
    }

    pub fn enqueue_execution(&self, id: i64, execution: Execution) {
        self.queues.push(|q| q.executions.push_back((id, execution)));
        let kind = match execution {
            Execution::Paused => AsyncPauseKind::Explicit,
            Execution::Running => AsyncPauseKind::Implicit,
        };
        self.trigger(kind);
    }

    pub fn enqueue_step(&self, id: i64, mode: StepMode) {
        self.queues.push(|q| q.steps.push_back((id, mode)));
        self.trigger(AsyncPauseKind::Implicit);
    }

    // -- dispatch ---------------------------------------------------------

    fn dispatch(&self, id: i64, method: String, kind: RequestKind) -> Result<(), AdapterError> {
        use RequestKind::*;
        match kind {
            DebuggerEnable => self.enqueue_attachment(id, Attachment::Enabled),
            DebuggerDisable => self.enqueue_attachment(id, Attachment::Disabled),
            DebuggerPause => self.enqueue_execution(id, Execution::Paused),
            DebuggerResume => self.enqueue_execution(id, Execution::Running),
            DebuggerStepInto => self.enqueue_step(id, StepMode::Into),
            DebuggerStepOver => self.enqueue_step(id, StepMode::Over),
            DebuggerStepOut => self.enqueue_step(id, StepMode::Out),
            DebuggerSetBreakpoint(params) => self.set_breakpoint(id, params)?,
            DebuggerSetBreakpointByUrl(params) => self.set_breakpoint_by_url(id, params)?,
            DebuggerRemoveBreakpoint(params) => self.remove_breakpoint(id, params)?,
            DebuggerSetBreakpointsActive(params) => self.set_breakpoints_active(id, params),
            DebuggerSetInstrumentationBreakpoint(params) => {
                self.set_instrumentation_breakpoint(id, params)?
            }
            DebuggerSetPauseOnExceptions(params) => self.set_pause_on_exceptions(id, params)?,
            DebuggerEvaluateOnCallFrame(params) => self.evaluate_on_call_frame(id, params)?,

            RuntimeEnable => self.runtime_enable(id),
            RuntimeDisable => self.runtime_disable(id),
            RuntimeEvaluate(params) => self.evaluate(id, params)?,
            RuntimeCallFunctionOn(params) => self.call_function_on(id, params)?,
            RuntimeCompileScript(params) => self.compile_script(id, params)?,
            RuntimeGetProperties(params) => self.get_properties(id, params),
            RuntimeGetHeapUsage => self.get_heap_usage(id),
            RuntimeGlobalLexicalScopeNames(params) => self.global_lexical_scope_names(id, params)?,
            RuntimeRunIfWaitingForDebugger => self.run_if_waiting_for_debugger(id),

            HeapProfilerTakeHeapSnapshot(params) => self.take_heap_snapshot(id, params, false),
            HeapProfilerStartTrackingHeapObjects(_) => self.start_tracking_heap_objects(id),
            HeapProfilerStopTrackingHeapObjects(params) => {
                self.take_heap_snapshot(id, params, true)
            }
            HeapProfilerStartSampling(params) => self.start_sampling(id, params),
            HeapProfilerStopSampling => self.stop_sampling(id),
            HeapProfilerCollectGarbage => self.collect_garbage(id),
            HeapProfilerGetObjectByHeapObjectId(params) => {
                self.get_object_by_heap_object_id(id, params)?
            }
            HeapProfilerGetHeapObjectId(params) => self.get_heap_object_id(id, params),

            ProfilerStart => self.profiler_start(id),
            ProfilerStop => self.profiler_stop(id),

            Unknown => return Err(AdapterError::MethodNotFound(method)),
        }
        Ok(())
    }

    // -- console ----------------------------------------------------------

    fn console_called(&self, engine: &mut dyn Engine, message: ConsoleMessage) {
        {
            let mut console = lock(&self.console);
            if !console.runtime_enabled {
                console.buffer.push(message);
                return;
            }
        }
        self.send_console_message(engine, message);
    }
}

/// Engine-side observer. Holds the adapter weakly so a dropped handler
/// leaves the engine running freely.
struct PauseObserver {
    shared: Weak<Shared>,
    heap_tracking: Arc<AtomicBool>,
}

impl EventObserver for PauseObserver {
    fn did_pause(&self, engine: &mut dyn Engine) -> Command {
        match self.shared.upgrade() {
            Some(shared) => shared.did_pause(engine),
            None => {
                detach_engine(engine, &self.heap_tracking);
                Command::Continue
            }
        }
    }
}

/// Undo what the adapter set up on the engine once its handler is gone.
/// Runs on the engine thread.
pub(crate) fn detach_engine(engine: &mut dyn Engine, heap_tracking: &AtomicBool) {
    if heap_tracking.swap(false, Ordering::SeqCst) {
        engine.instrumentation().stop_tracking_heap_objects();
    }
    engine.set_event_observer(None);
    tracing::info!("debugger adapter detached");
}

struct ConsoleForwarder(Weak<Shared>);

impl ConsoleHook for ConsoleForwarder {
    fn console_called(&self, engine: &mut dyn Engine, message: ConsoleMessage) {
        if let Some(shared) = self.0.upgrade() {
            shared.console_called(engine, message);
        }
    }
}

// ---------------------------------------------------------------------------
// CdpHandler
// ---------------------------------------------------------------------------

/// CDP debugger adapter for one engine.
pub struct CdpHandler {
    shared: Arc<Shared>,
}

impl CdpHandler {
    /// Attach an adapter to `engine`. Must run on the engine thread.
    ///
    /// Installs the intercepting console, asks the engine to pause on
    /// every script load and registers the pause observer.
    ///
    /// # Errors
    ///
    /// Fails when the console cannot be installed.
    pub fn new(
        engine: &mut dyn Engine,
        runtime: Arc<dyn RuntimeHandle>,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let shared = Arc::new_cyclic(|weak_self| Shared {
            weak_self: weak_self.clone(),
            queues: PendingQueues::new(options.wait_for_debugger),
            connection: Mutex::new(Connection::default()),
            virtual_breakpoints: Mutex::new(VirtualBreakpoints::new()),
            breakpoints_active: AtomicBool::new(true),
            attachment: AtomicU8::new(ATTACHMENT_NONE),
            console: Mutex::new(ConsoleState {
                runtime_enabled: false,
                buffer: ConsoleBuffer::new(options.console_buffer_capacity),
            }),
            objects: Mutex::new(RemoteObjectsTable::new()),
            pause: Mutex::new(PauseState::new()),
            heap_tracking: Arc::new(AtomicBool::new(false)),
            runtime,
            options,
        });

        install_console(engine, Arc::new(ConsoleForwarder(Arc::downgrade(&shared))))?;
        engine.set_should_pause_on_script_load(true);
        engine.set_event_observer(Some(Arc::new(PauseObserver {
            shared: Arc::downgrade(&shared),
            heap_tracking: Arc::clone(&shared.heap_tracking),
        })));
        tracing::info!(
            title = %shared.options.title,
            wait_for_debugger = shared.options.wait_for_debugger,
            "debugger adapter attached"
        );
        Ok(Self { shared })
    }

    /// Route outbound messages to `on_message` until unregistered.
    ///
    /// Returns false, leaving the existing registration in place, when
    /// callbacks are already registered.
    pub fn register_callbacks(
        &self,
        on_message: MessageCallback,
        on_unregister: Option<UnregisterCallback>,
    ) -> bool {
        let mut connection = lock(&self.shared.connection);
        if connection.on_message.is_some() {
            tracing::warn!("callbacks already registered");
            return false;
        }
        connection.on_message = Some(Arc::from(on_message));
        connection.on_unregister = on_unregister;
        tracing::debug!("client callbacks registered");
        true
    }

    /// Drop the registered callbacks, invoking the unregister callback.
    /// Returns false when nothing was registered.
    pub fn unregister_callbacks(&self) -> bool {
        let on_unregister = {
            let mut connection = lock(&self.shared.connection);
            if connection.on_message.take().is_none() {
                return false;
            }
            connection.on_unregister.take()
        };
        if let Some(callback) = on_unregister {
            callback();
        }
        tracing::debug!("client callbacks unregistered");
        true
    }

    pub fn title(&self) -> &str {
        &self.shared.options.title
    }

    /// Handle one inbound JSON message.
    ///
    /// Messages that are not a request at all are dropped; every request
    /// eventually gets exactly one response.
    pub fn handle(&self, message: &str) {
        let request = match parse_request(message) {
            Ok(request) => request,
            Err(ProtocolError::InvalidParams {
                id,
                method,
                message,
            }) => {
                let error = AdapterError::InvalidParams { method, message };
                self.shared.respond_error(id, &error);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropping unparseable message");
                return;
            }
        };

        tracing::debug!(id = request.id, method = %request.method, "request");
        if request.is_debugger_request()
            && request.kind != RequestKind::DebuggerEnable
            && self.shared.attachment() == Attachment::Disabled
        {
            self.shared
                .respond_error(request.id, &AdapterError::DebuggerNotEnabled);
            return;
        }

        let id = request.id;
        if let Err(err) = self.shared.dispatch(id, request.method, request.kind) {
            self.shared.respond_error(id, &err);
        }
    }
}

impl Drop for CdpHandler {
    fn drop(&mut self) {
        self.unregister_callbacks();
        self.shared.queues.push(|q| q.handler_dropped = true);
        // The engine detaches itself from its next pause callback.
        self.shared.runtime.trigger_async_pause(AsyncPauseKind::Implicit);
        self.shared.runtime.tickle();
    }
}
