//! A small interpreted engine used to drive the debugger adapter.
//!
//! [`EngineThread`] owns a [`ScriptedEngine`] on a dedicated thread and
//! feeds it work through a channel, the way an embedder's event loop would.

mod engine;
mod heap;
pub mod parser;

pub use engine::ScriptedEngine;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::debugger::AsyncPauseKind;
use crate::engine::RuntimeHandle;
use crate::error::EngineError;
use crate::value::Value;

use engine::{EXPLICIT_PAUSE_REQUESTED, IMPLICIT_PAUSE_REQUESTED};

type Task = Box<dyn FnOnce(&mut ScriptedEngine) + Send>;

enum Message {
    Task(Task),
    /// Wake up and deliver any pending async pause.
    Tickle,
    Stop,
}

/// [`RuntimeHandle`] for a [`ScriptedEngine`] running on an [`EngineThread`].
#[derive(Clone)]
pub struct ScriptedHandle {
    tx: Sender<Message>,
    pause_request: Arc<AtomicU8>,
}

impl RuntimeHandle for ScriptedHandle {
    fn trigger_async_pause(&self, kind: AsyncPauseKind) {
        let request = match kind {
            AsyncPauseKind::Implicit => IMPLICIT_PAUSE_REQUESTED,
            AsyncPauseKind::Explicit => EXPLICIT_PAUSE_REQUESTED,
        };
        // An explicit request is never downgraded by a later implicit one.
        self.pause_request.fetch_max(request, Ordering::SeqCst);
    }

    fn tickle(&self) {
        // A closed channel means the engine is gone; nothing to wake.
        let _ = self.tx.send(Message::Tickle);
    }
}

/// A [`ScriptedEngine`] running on its own thread.
pub struct EngineThread {
    handle: ScriptedHandle,
    console_output: Arc<Mutex<Vec<String>>>,
    join: Option<JoinHandle<()>>,
}

impl EngineThread {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        let pause_request = Arc::new(AtomicU8::new(0));
        let console_output = Arc::new(Mutex::new(Vec::new()));

        let engine_request = Arc::clone(&pause_request);
        let engine_output = Arc::clone(&console_output);
        let join = thread::Builder::new()
            .name("lookout-engine".into())
            .spawn(move || {
                let mut engine = ScriptedEngine::new(engine_request, engine_output);
                run_loop(&mut engine, &rx);
            })
            .ok();
        if join.is_none() {
            tracing::error!("failed to spawn engine thread");
        }

        Self {
            handle: ScriptedHandle { tx, pause_request },
            console_output,
            join,
        }
    }

    pub fn handle(&self) -> Arc<dyn RuntimeHandle> {
        Arc::new(self.handle.clone())
    }

    /// Run `f` on the engine thread and wait for its result.
    ///
    /// # Errors
    ///
    /// [`EngineError::Disconnected`] if the engine thread has stopped.
    pub fn with_engine<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ScriptedEngine) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.post(move |engine| {
            let _ = tx.send(f(engine));
        })?;
        rx.recv().map_err(|_| EngineError::Disconnected)
    }

    /// Queue `source` for execution; the receiver yields the outcome once
    /// the script finishes.
    pub fn run_script(
        &self,
        source: impl Into<String>,
        url: impl Into<String>,
    ) -> Receiver<Result<Value, EngineError>> {
        let (source, url) = (source.into(), url.into());
        let (tx, rx) = mpsc::channel();
        let posted = self.post(move |engine| {
            let _ = tx.send(engine.run_script(&source, &url));
        });
        if let Err(e) = posted {
            tracing::warn!(error = %e, "script dropped");
        }
        rx
    }

    /// Lines written by the engine's native console, as `method: text`.
    pub fn console_output(&self) -> Vec<String> {
        self.console_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the loop after already queued work and wait for the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn post(&self, task: impl FnOnce(&mut ScriptedEngine) + Send + 'static) -> Result<(), EngineError> {
        self.handle
            .tx
            .send(Message::Task(Box::new(task)))
            .map_err(|_| EngineError::Disconnected)
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(Message::Stop);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(engine: &mut ScriptedEngine, rx: &Receiver<Message>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Task(task) => task(engine),
            Message::Tickle => engine.service_async_pause(),
            Message::Stop => break,
        }
    }
    tracing::debug!("engine loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{Command, PauseReason};
    use crate::engine::{Engine, EventObserver};
    use std::time::Duration;

    struct Reasons(Mutex<Vec<PauseReason>>);

    impl EventObserver for Reasons {
        fn did_pause(&self, engine: &mut dyn Engine) -> Command {
            self.0.lock().unwrap().push(engine.program_state().pause_reason);
            Command::Continue
        }
    }

    #[test]
    fn thread_runs_scripts_in_order() {
        let thread = EngineThread::spawn();
        let first = thread.run_script("var a = 1", "a.js");
        let second = thread.run_script("var b = a + 1", "b.js");
        assert!(first.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());
        assert!(second.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());
        let b = thread
            .with_engine(|engine| {
                let global = engine.global();
                engine.get_property(&global, "b")
            })
            .unwrap()
            .unwrap();
        assert_eq!(b, Value::Number(2.0));
        thread.shutdown();
    }

    #[test]
    fn thread_tickle_delivers_pending_pause() {
        let thread = EngineThread::spawn();
        let reasons = Arc::new(Reasons(Mutex::new(Vec::new())));
        let observer = Arc::clone(&reasons);
        thread
            .with_engine(move |engine| engine.set_event_observer(Some(observer)))
            .unwrap();

        let handle = thread.handle();
        handle.trigger_async_pause(AsyncPauseKind::Explicit);
        handle.tickle();
        thread.with_engine(|_| ()).unwrap();

        assert_eq!(
            *reasons.0.lock().unwrap(),
            vec![PauseReason::AsyncTriggerExplicit]
        );
    }

    #[test]
    fn thread_tickle_without_request_is_quiet() {
        let thread = EngineThread::spawn();
        let reasons = Arc::new(Reasons(Mutex::new(Vec::new())));
        let observer = Arc::clone(&reasons);
        thread
            .with_engine(move |engine| engine.set_event_observer(Some(observer)))
            .unwrap();
        thread.handle().tickle();
        thread.with_engine(|_| ()).unwrap();
        assert!(reasons.0.lock().unwrap().is_empty());
    }

    #[test]
    fn thread_reports_script_errors() {
        let thread = EngineThread::spawn();
        let result = thread
            .run_script("throw 'bad'", "t.js")
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(matches!(result, Err(EngineError::Thrown(_))));
    }
}
