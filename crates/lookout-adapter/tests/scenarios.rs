//! End-to-end debugging sessions against the scripted engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lookout_adapter::{AdapterOptions, CdpHandler};
use lookout_engine::{EngineError, EngineThread, Value as JsValue};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(5);
const NO_HOLD: i64 = -1;

/// A client connected to an adapter on a live engine thread.
struct Session {
    handler: Option<CdpHandler>,
    thread: EngineThread,
    inbox: Receiver<String>,
    /// Every message received so far.
    seen: Vec<Value>,
    /// Received messages no `wait_for` has claimed yet.
    unclaimed: VecDeque<Value>,
    /// Response id the engine thread stops at until `release`.
    hold: Arc<AtomicI64>,
    release: Sender<()>,
}

impl Session {
    fn new() -> Self {
        Self::with_options(AdapterOptions::default())
    }

    fn with_options(options: AdapterOptions) -> Self {
        let thread = EngineThread::spawn();
        let runtime = thread.handle();
        let handler = thread
            .with_engine(move |engine| CdpHandler::new(engine, runtime, options))
            .unwrap()
            .unwrap();

        let (tx, inbox) = mpsc::channel();
        let tx = Mutex::new(tx);
        let (release, released) = mpsc::channel::<()>();
        let released = Mutex::new(released);
        let hold = Arc::new(AtomicI64::new(NO_HOLD));
        let held = Arc::clone(&hold);
        assert!(handler.register_callbacks(
            Box::new(move |message: String| {
                let target = held.load(Ordering::SeqCst);
                let stop = target != NO_HOLD
                    && serde_json::from_str::<Value>(&message)
                        .map(|m| m["id"] == target)
                        .unwrap_or(false);
                let _ = tx.lock().unwrap().send(message);
                if stop {
                    let _ = released.lock().unwrap().recv_timeout(TIMEOUT);
                }
            }),
            None,
        ));

        Self {
            handler: Some(handler),
            thread,
            inbox,
            seen: Vec::new(),
            unclaimed: VecDeque::new(),
            hold,
            release,
        }
    }

    /// Keep the engine thread inside the delivery of response `id` until
    /// `release`, so requests sent meanwhile land in one batch.
    fn hold_at(&self, id: i64) {
        self.hold.store(id, Ordering::SeqCst);
    }

    fn release(&self) {
        self.hold.store(NO_HOLD, Ordering::SeqCst);
        let _ = self.release.send(());
    }

    fn send(&self, id: i64, method: &str, params: Value) {
        let message = json!({ "id": id, "method": method, "params": params });
        self.handler
            .as_ref()
            .unwrap()
            .handle(&message.to_string());
    }

    fn run(&self, source: &str, url: &str) -> Receiver<Result<JsValue, EngineError>> {
        self.thread.run_script(source, url)
    }

    fn receive(&mut self) -> Value {
        let text = self
            .inbox
            .recv_timeout(TIMEOUT)
            .expect("timed out waiting for a message");
        let message: Value = serde_json::from_str(&text).unwrap();
        self.seen.push(message.clone());
        message
    }

    /// First message matching `pred`, oldest unclaimed ones first.
    fn wait_for(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        if let Some(index) = self.unclaimed.iter().position(&pred) {
            return self.unclaimed.remove(index).unwrap();
        }
        loop {
            let message = self.receive();
            if pred(&message) {
                return message;
            }
            self.unclaimed.push_back(message);
        }
    }

    fn response(&mut self, id: i64) -> Value {
        self.wait_for(|m| m["id"] == id)
    }

    fn notification(&mut self, method: &str) -> Value {
        self.wait_for(|m| m["method"] == method)
    }

    fn request(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(id, method, params);
        self.response(id)
    }

    /// Collect everything already delivered.
    fn drain(&mut self) {
        while let Ok(text) = self.inbox.try_recv() {
            let message: Value = serde_json::from_str(&text).unwrap();
            self.seen.push(message.clone());
            self.unclaimed.push_back(message);
        }
    }

    fn count(&self, method: &str) -> usize {
        self.seen.iter().filter(|m| m["method"] == method).count()
    }

    fn enable(&mut self) {
        let response = self.request(1000, "Debugger.enable", json!({}));
        assert_eq!(response["result"], json!({}));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Release a parked engine before the thread is joined.
        self.release();
        self.handler.take();
    }
}

fn finished(script: &Receiver<Result<JsValue, EngineError>>) -> Result<JsValue, EngineError> {
    script.recv_timeout(TIMEOUT).expect("script did not finish")
}

fn top_line(paused: &Value) -> i64 {
    paused["params"]["callFrames"][0]["location"]["lineNumber"]
        .as_i64()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Debugger domain
// ---------------------------------------------------------------------------

#[test]
fn debugger_statement_pauses_until_resumed() {
    let mut session = Session::new();
    session.enable();

    let script = session.run("var a = 1\ndebugger\nvar b = 2", "main.js");
    let parsed = session.notification("Debugger.scriptParsed");
    assert_eq!(parsed["params"]["url"], "main.js");
    assert_eq!(parsed["params"]["scriptId"], "1");
    assert_eq!(parsed["params"]["executionContextId"], 1);

    let paused = session.notification("Debugger.paused");
    assert_eq!(paused["params"]["reason"], "other");
    assert_eq!(top_line(&paused), 1);
    assert_eq!(paused["params"]["callFrames"][0]["location"]["scriptId"], "1");
    assert_eq!(paused["params"]["callFrames"][0]["callFrameId"], "0");
    assert!(paused["params"].get("hitBreakpoints").is_none());

    let response = session.request(1, "Debugger.resume", json!({}));
    assert_eq!(response["result"], json!({}));
    session.notification("Debugger.resumed");
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_breakpoint_by_url_then_step_over() {
    let mut session = Session::new();
    session.enable();

    let response = session.request(
        1,
        "Debugger.setBreakpointByUrl",
        json!({ "url": "steps.js", "lineNumber": 4 }),
    );
    assert!(response["result"]["breakpointId"].is_string());

    let source = "var a = 1\nvar b = 2\nvar c = 3\nvar d = 4\nvar e = 5\nvar f = 6\n";
    let script = session.run(source, "steps.js");

    let paused = session.notification("Debugger.paused");
    assert_eq!(top_line(&paused), 4);

    session.request(2, "Debugger.stepOver", json!({}));
    session.notification("Debugger.resumed");
    let stepped = session.notification("Debugger.paused");
    assert_eq!(top_line(&stepped), 5);
    assert!(stepped["params"].get("hitBreakpoints").is_none());

    session.request(3, "Debugger.resume", json!({}));
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_set_and_remove_breakpoint_by_script_id() {
    let mut session = Session::new();
    assert!(finished(&session.run("var a = 1\n\nvar b = 2", "ids.js")).is_ok());
    session.enable();

    let response = session.request(
        1,
        "Debugger.setBreakpoint",
        json!({ "location": { "scriptId": "1", "lineNumber": 1 } }),
    );
    let breakpoint_id = response["result"]["breakpointId"].as_str().unwrap().to_string();
    assert_eq!(response["result"]["actualLocation"]["lineNumber"], 2);

    let removed = session.request(
        2,
        "Debugger.removeBreakpoint",
        json!({ "breakpointId": breakpoint_id }),
    );
    assert_eq!(removed["result"], json!({}));

    let unknown = session.request(
        3,
        "Debugger.removeBreakpoint",
        json!({ "breakpointId": "virtualbreakpoint-99" }),
    );
    assert_eq!(unknown["error"]["code"], -32000);
    assert_eq!(
        unknown["error"]["message"],
        "Unknown breakpoint ID: virtualbreakpoint-99"
    );

    let bad = session.request(
        4,
        "Debugger.setBreakpoint",
        json!({ "location": { "scriptId": "main", "lineNumber": 0 } }),
    );
    assert_eq!(bad["error"]["code"], -32000);
}

#[test]
fn debugger_inactive_breakpoints_are_skipped() {
    let mut session = Session::new();
    session.enable();
    session.request(
        1,
        "Debugger.setBreakpointByUrl",
        json!({ "url": "quiet.js", "lineNumber": 1 }),
    );
    let response = session.request(2, "Debugger.setBreakpointsActive", json!({ "active": false }));
    assert_eq!(response["result"], json!({}));

    assert!(finished(&session.run("var a = 1\nvar b = 2\nvar c = 3", "quiet.js")).is_ok());
    session.drain();
    assert_eq!(session.count("Debugger.paused"), 0);
}

#[test]
fn debugger_reactivated_breakpoints_fire_again() {
    let mut session = Session::new();
    session.enable();
    session.request(
        1,
        "Debugger.setBreakpointByUrl",
        json!({ "url": "again.js", "lineNumber": 1 }),
    );
    session.request(2, "Debugger.setBreakpointsActive", json!({ "active": false }));

    let source = "function f() {\n  var x = 1\n}\nf()\ndebugger\nf()\n";
    let script = session.run(source, "again.js");

    // The first call runs over the inactive breakpoint.
    let parked = session.notification("Debugger.paused");
    assert_eq!(top_line(&parked), 4);

    let response = session.request(3, "Debugger.setBreakpointsActive", json!({ "active": true }));
    assert_eq!(response["result"], json!({}));
    session.request(4, "Debugger.resume", json!({}));

    let hit = session.notification("Debugger.paused");
    assert_eq!(hit["params"]["reason"], "other");
    assert_eq!(top_line(&hit), 1);
    assert_eq!(hit["params"]["callFrames"][0]["functionName"], "f");

    session.request(5, "Debugger.resume", json!({}));
    assert!(finished(&script).is_ok());
    session.drain();
    assert_eq!(session.count("Debugger.paused"), 2);
}

#[test]
fn debugger_disable_then_pause_in_one_batch_stays_paused() {
    let mut session = Session::new();
    session.enable();
    let script = session.run("var a = 1\ndebugger\nvar b = 2", "batch.js");
    session.notification("Debugger.paused");

    session.hold_at(1);
    session.send(1, "Debugger.enable", json!({}));
    session.response(1);
    session.send(2, "Debugger.disable", json!({}));
    session.send(3, "Debugger.pause", json!({}));
    session.release();

    assert_eq!(session.response(2)["result"], json!({}));
    assert_eq!(session.response(3)["result"], json!({}));
    assert!(matches!(
        script.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout)
    ));
    session.drain();
    assert_eq!(session.count("Debugger.resumed"), 0);

    // Re-attaching finds the engine still parked.
    session.request(4, "Debugger.enable", json!({}));
    session.request(5, "Debugger.resume", json!({}));
    session.notification("Debugger.resumed");
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_instrumentation_breakpoint_needs_source_map() {
    let mut session = Session::new();
    session.enable();

    let response = session.request(
        1,
        "Debugger.setInstrumentationBreakpoint",
        json!({ "instrumentation": "beforeScriptWithSourceMapExecution" }),
    );
    let breakpoint_id = response["result"]["breakpointId"].as_str().unwrap().to_string();
    assert!(breakpoint_id.starts_with("virtualbreakpoint-"));

    assert!(finished(&session.run("var a = 1", "plain.js")).is_ok());
    session.drain();
    assert_eq!(session.count("Debugger.paused"), 0);

    let script = session.run("var b = 2\n//# sourceMappingURL=mapped.js.map", "mapped.js");
    let parsed = session.wait_for(|m| {
        m["method"] == "Debugger.scriptParsed" && m["params"]["url"] == "mapped.js"
    });
    assert_eq!(parsed["params"]["sourceMapURL"], "mapped.js.map");

    let paused = session.notification("Debugger.paused");
    assert_eq!(paused["params"]["reason"], "other");
    assert_eq!(paused["params"]["hitBreakpoints"], json!([breakpoint_id]));

    session.request(2, "Debugger.resume", json!({}));
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_unknown_instrumentation_is_rejected() {
    let mut session = Session::new();
    let response = session.request(
        1,
        "Debugger.setInstrumentationBreakpoint",
        json!({ "instrumentation": "beforeScriptExecution" }),
    );
    assert_eq!(response["error"]["code"], -32000);
}

#[test]
fn debugger_enable_replays_loaded_scripts() {
    let mut session = Session::new();
    assert!(finished(&session.run("var a = 1", "early.js")).is_ok());
    session.drain();
    assert_eq!(session.count("Debugger.scriptParsed"), 0);

    session.enable();
    let parsed = session.notification("Debugger.scriptParsed");
    assert_eq!(parsed["params"]["url"], "early.js");

    session.request(1, "Debugger.disable", json!({}));
    session.request(2, "Debugger.enable", json!({}));
    let replayed = session.notification("Debugger.scriptParsed");
    assert_eq!(replayed["params"]["url"], "early.js");
}

#[test]
fn debugger_enable_replays_scripts_in_load_order() {
    let mut session = Session::new();
    for url in ["one.js", "two.js", "three.js"] {
        assert!(finished(&session.run("var a = 1", url)).is_ok());
    }

    for (enable_id, disable_id) in [(1, 2), (3, 4)] {
        session.request(enable_id, "Debugger.enable", json!({}));
        let urls: Vec<Value> = (0..3)
            .map(|_| session.notification("Debugger.scriptParsed")["params"]["url"].clone())
            .collect();
        assert_eq!(urls, vec![json!("one.js"), json!("two.js"), json!("three.js")]);
        session.request(disable_id, "Debugger.disable", json!({}));
    }
}

#[test]
fn debugger_requests_fail_while_disabled() {
    let mut session = Session::new();
    session.enable();
    session.request(1, "Debugger.disable", json!({}));

    let response = session.request(2, "Debugger.pause", json!({}));
    assert_eq!(response["error"]["code"], -32000);
    assert_eq!(response["error"]["message"], "Debugger agent is not enabled");

    let runtime = session.request(3, "Runtime.getHeapUsage", json!({}));
    assert!(runtime["result"]["usedSize"].is_number());
}

#[test]
fn debugger_pause_on_uncaught_exceptions_only() {
    let mut session = Session::new();
    session.enable();
    let response = session.request(
        1,
        "Debugger.setPauseOnExceptions",
        json!({ "state": "uncaught" }),
    );
    assert_eq!(response["result"], json!({}));

    let script = session.run("try { throw 1 } catch (e) {}\nthrow 'boom'", "throws.js");
    let paused = session.notification("Debugger.paused");
    assert_eq!(paused["params"]["reason"], "exception");
    assert_eq!(top_line(&paused), 1);

    session.request(2, "Debugger.resume", json!({}));
    assert!(finished(&script).is_err());
    session.drain();
    assert_eq!(session.count("Debugger.paused"), 1);

    let bad = session.request(3, "Debugger.setPauseOnExceptions", json!({ "state": "some" }));
    assert_eq!(bad["error"]["code"], -32000);
}

#[test]
fn debugger_pause_on_all_exceptions_stops_at_each_throw() {
    let mut session = Session::new();
    session.enable();
    session.request(1, "Debugger.setPauseOnExceptions", json!({ "state": "all" }));

    let script = session.run("try { throw 1 } catch (e) {}\nthrow 'boom'", "all.js");
    let caught = session.notification("Debugger.paused");
    assert_eq!(caught["params"]["reason"], "exception");
    assert_eq!(top_line(&caught), 0);
    session.request(2, "Debugger.resume", json!({}));

    let uncaught = session.notification("Debugger.paused");
    assert_eq!(uncaught["params"]["reason"], "exception");
    assert_eq!(top_line(&uncaught), 1);
    session.request(3, "Debugger.resume", json!({}));

    assert!(finished(&script).is_err());
    session.drain();
    assert_eq!(session.count("Debugger.paused"), 2);
}

#[test]
fn debugger_resume_aborts_queued_evaluation() {
    let mut session = Session::new();
    session.enable();
    let script = session.run("var a = 1\ndebugger\nvar b = 2", "stale.js");
    session.notification("Debugger.paused");

    session.hold_at(1);
    session.send(1, "Debugger.enable", json!({}));
    session.response(1);
    session.send(2, "Debugger.resume", json!({}));
    session.send(
        3,
        "Debugger.evaluateOnCallFrame",
        json!({ "callFrameId": "0", "expression": "a" }),
    );
    session.release();

    assert_eq!(session.response(2)["result"], json!({}));
    let aborted = session.response(3);
    assert_eq!(aborted["error"]["code"], -32000);
    assert_eq!(
        aborted["error"]["message"],
        "Evaluation aborted: execution resumed"
    );
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_breakpoint_positions_out_of_range_are_rejected() {
    let mut session = Session::new();
    assert!(finished(&session.run("var a = 1\nvar b = 2", "range.js")).is_ok());
    session.enable();

    let by_url = session.request(
        1,
        "Debugger.setBreakpointByUrl",
        json!({ "url": "range.js", "lineNumber": i64::MAX }),
    );
    assert_eq!(by_url["error"]["code"], -32000);
    assert_eq!(
        by_url["error"]["message"],
        format!("invalid location: {} is out of range", i64::MAX)
    );

    let by_id = session.request(
        2,
        "Debugger.setBreakpoint",
        json!({ "location": { "scriptId": "1", "lineNumber": 4_294_967_297_i64 } }),
    );
    assert_eq!(by_id["error"]["code"], -32000);

    let column = session.request(
        3,
        "Debugger.setBreakpoint",
        json!({ "location": { "scriptId": "1", "lineNumber": 0, "columnNumber": i64::MAX } }),
    );
    assert_eq!(column["error"]["code"], -32000);

    // The adapter keeps serving after the rejections.
    let ok = session.request(
        4,
        "Debugger.setBreakpoint",
        json!({ "location": { "scriptId": "1", "lineNumber": 1 } }),
    );
    assert_eq!(ok["result"]["actualLocation"]["lineNumber"], 1);
}

#[test]
fn debugger_evaluate_on_call_frame_sees_locals() {
    let mut session = Session::new();
    session.enable();
    let source = "function f(n) {\n  var doubled = n * 2\n  debugger\n}\nf(21)\n";
    let script = session.run(source, "frames.js");
    let paused = session.notification("Debugger.paused");
    assert_eq!(paused["params"]["callFrames"][0]["functionName"], "f");

    let response = session.request(
        1,
        "Debugger.evaluateOnCallFrame",
        json!({ "callFrameId": "0", "expression": "doubled + 1" }),
    );
    assert_eq!(response["result"]["result"]["value"].as_f64(), Some(43.0));

    let bad = session.request(
        2,
        "Debugger.evaluateOnCallFrame",
        json!({ "callFrameId": "top", "expression": "1" }),
    );
    assert_eq!(bad["error"]["code"], -32000);

    session.request(3, "Debugger.resume", json!({}));
    assert!(finished(&script).is_ok());
}

#[test]
fn debugger_resume_releases_backtrace_objects() {
    let mut session = Session::new();
    session.enable();
    let script = session.run("var o = {x: 1}\ndebugger\n", "objects.js");
    session.notification("Debugger.paused");

    let evaluated = session.request(
        1,
        "Debugger.evaluateOnCallFrame",
        json!({ "callFrameId": "0", "expression": "o" }),
    );
    let object_id = evaluated["result"]["result"]["objectId"]
        .as_str()
        .unwrap()
        .to_string();

    let properties = session.request(
        2,
        "Runtime.getProperties",
        json!({ "objectId": object_id, "ownProperties": true }),
    );
    let names: Vec<&str> = properties["result"]["result"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"x"));

    session.request(3, "Debugger.resume", json!({}));
    assert!(finished(&script).is_ok());

    let stale = session.request(
        4,
        "Runtime.getProperties",
        json!({ "objectId": object_id, "ownProperties": true }),
    );
    assert_eq!(stale["error"]["message"], "Object is not available");
}

// ---------------------------------------------------------------------------
// Runtime domain
// ---------------------------------------------------------------------------

#[test]
fn runtime_unknown_method_is_not_found() {
    let mut session = Session::new();
    let response = session.request(7, "Runtime.frobnicate", json!({}));
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["message"], "Runtime.frobnicate wasn't found");
}

#[test]
fn runtime_evaluations_answer_in_order() {
    let mut session = Session::new();
    session.send(1, "Runtime.evaluate", json!({ "expression": "1 + 1" }));
    session.send(2, "Runtime.evaluate", json!({ "expression": "'x'" }));

    let first = session.wait_for(|m| m.get("id").is_some());
    assert_eq!(first["id"], 1);
    assert_eq!(first["result"]["result"]["value"].as_f64(), Some(2.0));
    let second = session.wait_for(|m| m.get("id").is_some());
    assert_eq!(second["id"], 2);
    assert_eq!(second["result"]["result"]["value"], "x");
}

#[test]
fn runtime_evaluate_reports_exceptions() {
    let mut session = Session::new();
    let response = session.request(
        1,
        "Runtime.evaluate",
        json!({ "expression": "throw new Error('bad')" }),
    );
    assert!(response["result"]["exceptionDetails"].is_object());

    let wrong_context = session.request(
        2,
        "Runtime.evaluate",
        json!({ "expression": "1", "contextId": 5 }),
    );
    assert_eq!(wrong_context["error"]["code"], -32000);
}

#[test]
fn runtime_deeply_nested_expression_is_a_syntax_error() {
    let mut session = Session::new();
    let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    let response = session.request(1, "Runtime.evaluate", json!({ "expression": deep }));
    assert!(response["result"]["exceptionDetails"].is_object());

    // The engine thread survived.
    let after = session.request(2, "Runtime.evaluate", json!({ "expression": "2 * 3" }));
    assert_eq!(after["result"]["result"]["value"].as_f64(), Some(6.0));
}

#[test]
fn runtime_enable_flushes_buffered_console_with_warning() {
    let options = AdapterOptions {
        console_buffer_capacity: 2,
        ..AdapterOptions::default()
    };
    let mut session = Session::with_options(options);
    let source = "console.log('a')\nconsole.log('b')\nconsole.log('c')";
    assert!(finished(&session.run(source, "console.js")).is_ok());

    let response = session.request(1, "Runtime.enable", json!({}));
    assert_eq!(response["result"], json!({}));
    let context = session.notification("Runtime.executionContextCreated");
    assert_eq!(context["params"]["context"]["id"], 1);
    assert_eq!(context["params"]["context"]["name"], "lookout");

    let warning = session.notification("Runtime.consoleAPICalled");
    assert_eq!(warning["params"]["type"], "warning");
    let text = warning["params"]["args"][0]["value"].as_str().unwrap();
    assert!(text.contains("1 message was discarded"));

    let b = session.notification("Runtime.consoleAPICalled");
    assert_eq!(b["params"]["args"][0]["value"], "b");
    let c = session.notification("Runtime.consoleAPICalled");
    assert_eq!(c["params"]["args"][0]["value"], "c");
    assert!(
        warning["params"]["timestamp"].as_f64().unwrap()
            < b["params"]["timestamp"].as_f64().unwrap()
    );

    assert!(finished(&session.run("console.log('live')", "live.js")).is_ok());
    let live = session.notification("Runtime.consoleAPICalled");
    assert_eq!(live["params"]["args"][0]["value"], "live");
}

#[test]
fn runtime_run_if_waiting_releases_first_script() {
    let options = AdapterOptions {
        wait_for_debugger: true,
        ..AdapterOptions::default()
    };
    let mut session = Session::with_options(options);
    session.enable();

    let script = session.run("var a = 1", "first.js");
    let paused = session.notification("Debugger.paused");
    assert_eq!(paused["params"]["reason"], "other");
    assert!(matches!(
        script.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout)
    ));

    let response = session.request(1, "Runtime.runIfWaitingForDebugger", json!({}));
    assert_eq!(response["result"], json!({}));
    session.notification("Debugger.resumed");
    assert!(finished(&script).is_ok());

    // Only the first script is held.
    assert!(finished(&session.run("var b = 2", "second.js")).is_ok());
}

#[test]
fn runtime_call_function_on_object() {
    let mut session = Session::new();
    let evaluated = session.request(1, "Runtime.evaluate", json!({ "expression": "({n: 4})" }));
    let object_id = evaluated["result"]["result"]["objectId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = session.request(
        2,
        "Runtime.callFunctionOn",
        json!({
            "functionDeclaration": "function (k) { return this.n * k }",
            "objectId": object_id,
            "arguments": [{ "value": 3 }],
        }),
    );
    assert_eq!(response["result"]["result"]["value"].as_f64(), Some(12.0));

    let ambiguous = session.request(
        3,
        "Runtime.callFunctionOn",
        json!({ "functionDeclaration": "function () { return 1 }" }),
    );
    assert_eq!(
        ambiguous["error"]["message"],
        "The request must specify either object id or execution context id."
    );
}

// ---------------------------------------------------------------------------
// HeapProfiler and Profiler domains
// ---------------------------------------------------------------------------

#[test]
fn heap_snapshot_streams_chunks_before_response() {
    let options = AdapterOptions {
        heap_snapshot_chunk_size: 64,
        ..AdapterOptions::default()
    };
    let mut session = Session::with_options(options);
    let response = session.request(
        1,
        "HeapProfiler.takeHeapSnapshot",
        json!({ "reportProgress": true }),
    );
    assert_eq!(response["result"], json!({}));

    assert_eq!(session.count("HeapProfiler.reportHeapSnapshotProgress"), 1);
    let chunks: Vec<&str> = session
        .seen
        .iter()
        .filter(|m| m["method"] == "HeapProfiler.addHeapSnapshotChunk")
        .filter_map(|m| m["params"]["chunk"].as_str())
        .collect();
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.len() <= 64));
    let snapshot: Value = serde_json::from_str(&chunks.concat()).unwrap();
    assert!(snapshot.is_object());
}

#[test]
fn heap_object_ids_resolve_both_ways() {
    let mut session = Session::new();
    let evaluated = session.request(1, "Runtime.evaluate", json!({ "expression": "({a: 1})" }));
    let object_id = evaluated["result"]["result"]["objectId"]
        .as_str()
        .unwrap()
        .to_string();

    let heap = session.request(
        2,
        "HeapProfiler.getHeapObjectId",
        json!({ "objectId": object_id }),
    );
    let heap_id = heap["result"]["heapSnapshotObjectId"]
        .as_str()
        .unwrap()
        .to_string();

    let back = session.request(
        3,
        "HeapProfiler.getObjectByHeapObjectId",
        json!({ "objectId": heap_id }),
    );
    assert_eq!(back["result"]["result"]["type"], "object");

    let missing = session.request(
        4,
        "HeapProfiler.getObjectByHeapObjectId",
        json!({ "objectId": "not-a-number" }),
    );
    assert_eq!(missing["error"]["message"], "Object is not available");
}

#[test]
fn heap_tracking_reports_stats() {
    let mut session = Session::new();
    session.request(1, "HeapProfiler.startTrackingHeapObjects", json!({}));
    let seen = session.notification("HeapProfiler.lastSeenObjectId");
    assert!(seen["params"]["lastSeenObjectId"].is_number());
    let stats = session.notification("HeapProfiler.heapStatsUpdate");
    let update = stats["params"]["statsUpdate"].as_array().unwrap();
    assert_eq!(update.len() % 3, 0);

    let stopped = session.request(2, "HeapProfiler.stopTrackingHeapObjects", json!({}));
    assert_eq!(stopped["result"], json!({}));
}

#[test]
fn profiler_stop_without_start_is_internal_error() {
    let mut session = Session::new();
    let response = session.request(1, "Profiler.stop", json!({}));
    assert_eq!(response["error"]["code"], -32603);

    session.request(2, "Profiler.start", json!({}));
    let stopped = session.request(3, "Profiler.stop", json!({}));
    assert!(stopped["result"]["profile"]["nodes"].is_array());
}
