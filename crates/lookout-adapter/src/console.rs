//! Console interception.
//!
//! [`install_console`] replaces the global `console` with an object whose
//! methods forward to the console that was already installed, if any,
//! and then report the call through a [`ConsoleHook`]. Calls made before
//! the client enables the Runtime domain wait in a [`ConsoleBuffer`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lookout_engine::{Engine, EngineError, HostFunction, Value};

/// `(console method, reported call type)` pairs.
const CONSOLE_METHODS: [(&str, &str); 16] = [
    ("assert", "assert"),
    ("clear", "clear"),
    ("debug", "debug"),
    ("dir", "dir"),
    ("dirxml", "dirxml"),
    ("error", "error"),
    ("group", "startGroup"),
    ("groupCollapsed", "startGroupCollapsed"),
    ("groupEnd", "endGroup"),
    ("info", "info"),
    ("log", "log"),
    ("profile", "profile"),
    ("profileEnd", "profileEnd"),
    ("table", "table"),
    ("trace", "trace"),
    ("warn", "warning"),
];

/// One intercepted console call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage {
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
    pub call_type: String,
    pub args: Vec<Value>,
}

impl ConsoleMessage {
    pub fn now(call_type: &str, args: Vec<Value>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        Self {
            timestamp,
            call_type: call_type.to_string(),
            args,
        }
    }
}

/// Receives every intercepted console call, on the engine thread.
pub trait ConsoleHook: Send + Sync {
    fn console_called(&self, engine: &mut dyn Engine, message: ConsoleMessage);
}

/// Report a console call, or drop it when it is a passing assertion.
fn report(
    hook: &dyn ConsoleHook,
    engine: &mut dyn Engine,
    method: &str,
    call_type: &str,
    args: &[Value],
) {
    let (call_type, args) = if method == "assert" {
        match args.split_first() {
            None => ("warning", Vec::new()),
            Some((condition, _)) if condition.is_truthy() => return,
            Some((_, rest)) => ("warning", rest.to_vec()),
        }
    } else {
        (call_type, args.to_vec())
    };
    hook.console_called(engine, ConsoleMessage::now(call_type, args));
}

/// Install the intercepting console as the global `console`.
///
/// Each wrapper calls the method of the same name on the previous console
/// object, when there was one, with `this` bound to that object.
///
/// # Errors
///
/// Fails when the engine rejects a property write, or when the original
/// console method throws at call time.
pub fn install_console(
    engine: &mut dyn Engine,
    hook: Arc<dyn ConsoleHook>,
) -> Result<(), EngineError> {
    let global = engine.global();
    let original = engine.get_property(&global, "console")?;
    let console = engine.create_object();

    for (method, call_type) in CONSOLE_METHODS {
        let original = original.clone();
        let hook = Arc::clone(&hook);
        let wrapper: HostFunction = Arc::new(move |engine, _this, args| {
            if matches!(original, Value::Object(_)) {
                let function = engine.get_property(&original, method)?;
                if function.is_function() {
                    engine.call(&function, &original, args)?;
                }
            }
            report(hook.as_ref(), engine, method, call_type, args);
            Ok(Value::Undefined)
        });
        let function = engine.create_host_function(method, wrapper);
        engine.set_property(&console, method, function)?;
    }

    engine.set_property(&global, "console", console)?;
    tracing::debug!(methods = CONSOLE_METHODS.len(), "console interception installed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

/// Bounded FIFO of console calls awaiting `Runtime.enable`.
///
/// When full, the oldest message is evicted and counted as discarded.
#[derive(Debug)]
pub struct ConsoleBuffer {
    capacity: usize,
    messages: VecDeque<ConsoleMessage>,
    discarded: usize,
}

impl ConsoleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::new(),
            discarded: 0,
        }
    }

    pub fn push(&mut self, message: ConsoleMessage) {
        if self.capacity == 0 {
            self.discarded += 1;
            return;
        }
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
            self.discarded += 1;
        }
        self.messages.push_back(message);
    }

    /// Drain the buffer, returning the retained messages oldest first and
    /// how many were evicted since the last drain.
    pub fn take(&mut self) -> (Vec<ConsoleMessage>, usize) {
        let messages = self.messages.drain(..).collect();
        (messages, std::mem::take(&mut self.discarded))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Text of the warning announcing `discarded` evicted messages.
pub fn discarded_warning(discarded: usize) -> String {
    let noun = if discarded == 1 {
        "message was"
    } else {
        "messages were"
    };
    format!(
        "Only limited number of console messages can be cached. \
         {discarded} {noun} discarded at the beginning."
    )
}
