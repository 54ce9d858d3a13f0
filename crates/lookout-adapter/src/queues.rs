//! Work handed from client threads to the engine thread.
//!
//! Requests that need the engine are queued here and replayed in FIFO
//! order (per queue) at the next pause. A blocked pause callback sleeps on
//! the condition variable until something arrives.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use lookout_engine::{EvalResult, StepMode};

use crate::convert::ObjectOptions;
use crate::error::AdapterError;
use crate::pause::PauseContext;

/// Whether a client has the Debugger domain enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// No `Debugger.enable` or `Debugger.disable` processed yet.
    None,
    Enabled,
    Disabled,
}

/// Whether the engine is held for client inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Paused,
    Running,
}

/// Deferred action run on the engine thread at the next pause.
pub type PendingFunc = Box<dyn FnOnce(&mut PauseContext<'_>) + Send>;

/// Post-processing of an evaluation result, skipped when the evaluation
/// itself threw.
pub type OnEvalComplete = Box<
    dyn FnOnce(&mut PauseContext<'_>, EvalResult) -> Result<EvalResult, AdapterError> + Send,
>;

pub struct PendingEval {
    pub id: i64,
    pub frame_index: u32,
    pub expression: String,
    /// Group for handles minted in the response.
    pub object_group: String,
    pub options: ObjectOptions,
    pub on_complete: Option<OnEvalComplete>,
}

#[derive(Default)]
pub struct Queues {
    pub attachments: VecDeque<(i64, Attachment)>,
    pub executions: VecDeque<(i64, Execution)>,
    pub steps: VecDeque<(i64, StepMode)>,
    pub evals: VecDeque<PendingEval>,
    pub funcs: VecDeque<PendingFunc>,
    /// Set until the first resume after a wait-for-debugger start.
    pub awaiting_debugger_on_start: bool,
    /// The handler is gone; a waiting pause callback must let go.
    pub handler_dropped: bool,
}

impl Queues {
    fn has_work(&self) -> bool {
        !(self.attachments.is_empty()
            && self.executions.is_empty()
            && self.steps.is_empty()
            && self.evals.is_empty()
            && self.funcs.is_empty())
    }
}

/// [`Queues`] behind one mutex, with a condition variable for the
/// engine thread.
pub struct PendingQueues {
    queues: Mutex<Queues>,
    wake: Condvar,
}

impl PendingQueues {
    pub fn new(awaiting_debugger_on_start: bool) -> Self {
        Self {
            queues: Mutex::new(Queues {
                awaiting_debugger_on_start,
                ..Queues::default()
            }),
            wake: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the queues locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Queues) -> R) -> R {
        f(&mut self.guard())
    }

    /// Mutate the queues and wake a waiting pause callback.
    pub fn push(&self, f: impl FnOnce(&mut Queues)) {
        f(&mut self.guard());
        self.wake.notify_all();
    }

    /// Block until some queue holds work. Returns false once the handler
    /// has been dropped.
    pub fn wait_for_work(&self) -> bool {
        let mut queues = self.guard();
        while !queues.has_work() && !queues.handler_dropped {
            queues = self
                .wake
                .wait(queues)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !queues.handler_dropped
    }
}
