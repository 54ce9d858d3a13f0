//! Inbound CDP requests.
//!
//! A request is decoded in two stages: the envelope (`id`, `method`,
//! `params`) and then the method-specific params. Envelope failures are
//! unanswerable; params failures carry the request id so the caller can
//! still respond.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{CallArgument, Location};

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: i64,
    pub method: String,
    pub kind: RequestKind,
}

impl Request {
    /// Whether the method belongs to the `Debugger` domain.
    pub fn is_debugger_request(&self) -> bool {
        self.method.starts_with("Debugger.")
    }
}

/// One variant per supported method.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    DebuggerEnable,
    DebuggerDisable,
    DebuggerPause,
    DebuggerResume,
    DebuggerStepInto,
    DebuggerStepOver,
    DebuggerStepOut,
    DebuggerSetBreakpoint(SetBreakpointParams),
    DebuggerSetBreakpointByUrl(SetBreakpointByUrlParams),
    DebuggerRemoveBreakpoint(RemoveBreakpointParams),
    DebuggerSetBreakpointsActive(SetBreakpointsActiveParams),
    DebuggerSetInstrumentationBreakpoint(SetInstrumentationBreakpointParams),
    DebuggerSetPauseOnExceptions(SetPauseOnExceptionsParams),
    DebuggerEvaluateOnCallFrame(EvaluateOnCallFrameParams),

    RuntimeEnable,
    RuntimeDisable,
    RuntimeEvaluate(EvaluateParams),
    RuntimeCallFunctionOn(CallFunctionOnParams),
    RuntimeCompileScript(CompileScriptParams),
    RuntimeGetProperties(GetPropertiesParams),
    RuntimeGetHeapUsage,
    RuntimeGlobalLexicalScopeNames(GlobalLexicalScopeNamesParams),
    RuntimeRunIfWaitingForDebugger,

    HeapProfilerTakeHeapSnapshot(TakeHeapSnapshotParams),
    HeapProfilerStartTrackingHeapObjects(StartTrackingHeapObjectsParams),
    HeapProfilerStopTrackingHeapObjects(TakeHeapSnapshotParams),
    HeapProfilerStartSampling(StartSamplingParams),
    HeapProfilerStopSampling,
    HeapProfilerCollectGarbage,
    HeapProfilerGetObjectByHeapObjectId(GetObjectByHeapObjectIdParams),
    HeapProfilerGetHeapObjectId(GetHeapObjectIdParams),

    ProfilerStart,
    ProfilerStop,

    /// Any method this adapter does not implement.
    Unknown,
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointParams {
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlParams {
    pub line_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointParams {
    pub breakpoint_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsActiveParams {
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInstrumentationBreakpointParams {
    pub instrumentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPauseOnExceptionsParams {
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameParams {
    pub call_frame_id: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_preview: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_preview: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnParams {
    pub function_declaration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<CallArgument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_preview: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileScriptParams {
    pub expression: String,
    #[serde(rename = "sourceURL", default)]
    pub source_url: String,
    pub persist_script: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_properties: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_preview: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLexicalScopeNamesParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeHeapSnapshotParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_progress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_numeric_value: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingHeapObjectsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_allocations: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectByHeapObjectIdParams {
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHeapObjectIdParams {
    pub object_id: String,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Envelope {
    id: i64,
    method: String,
    #[serde(default)]
    params: Value,
}

impl Envelope {
    fn params<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let params = match &self.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
            id: self.id,
            method: self.method.clone(),
            message: e.to_string(),
        })
    }
}

/// Decode a raw JSON request.
///
/// # Errors
///
/// [`ProtocolError::Parse`] when the envelope is unusable and
/// [`ProtocolError::InvalidParams`] when a known method's params are
/// malformed.
pub fn parse_request(text: &str) -> Result<Request, ProtocolError> {
    let env: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Parse(e.to_string()))?;

    use RequestKind::*;
    let kind = match env.method.as_str() {
        "Debugger.enable" => DebuggerEnable,
        "Debugger.disable" => DebuggerDisable,
        "Debugger.pause" => DebuggerPause,
        "Debugger.resume" => DebuggerResume,
        "Debugger.stepInto" => DebuggerStepInto,
        "Debugger.stepOver" => DebuggerStepOver,
        "Debugger.stepOut" => DebuggerStepOut,
        "Debugger.setBreakpoint" => DebuggerSetBreakpoint(env.params()?),
        "Debugger.setBreakpointByUrl" => DebuggerSetBreakpointByUrl(env.params()?),
        "Debugger.removeBreakpoint" => DebuggerRemoveBreakpoint(env.params()?),
        "Debugger.setBreakpointsActive" => DebuggerSetBreakpointsActive(env.params()?),
        "Debugger.setInstrumentationBreakpoint" => {
            DebuggerSetInstrumentationBreakpoint(env.params()?)
        }
        "Debugger.setPauseOnExceptions" => DebuggerSetPauseOnExceptions(env.params()?),
        "Debugger.evaluateOnCallFrame" => DebuggerEvaluateOnCallFrame(env.params()?),

        "Runtime.enable" => RuntimeEnable,
        "Runtime.disable" => RuntimeDisable,
        "Runtime.evaluate" => RuntimeEvaluate(env.params()?),
        "Runtime.callFunctionOn" => RuntimeCallFunctionOn(env.params()?),
        "Runtime.compileScript" => RuntimeCompileScript(env.params()?),
        "Runtime.getProperties" => RuntimeGetProperties(env.params()?),
        "Runtime.getHeapUsage" => RuntimeGetHeapUsage,
        "Runtime.globalLexicalScopeNames" => RuntimeGlobalLexicalScopeNames(env.params()?),
        "Runtime.runIfWaitingForDebugger" => RuntimeRunIfWaitingForDebugger,

        "HeapProfiler.takeHeapSnapshot" => HeapProfilerTakeHeapSnapshot(env.params()?),
        "HeapProfiler.startTrackingHeapObjects" => {
            HeapProfilerStartTrackingHeapObjects(env.params()?)
        }
        "HeapProfiler.stopTrackingHeapObjects" => {
            HeapProfilerStopTrackingHeapObjects(env.params()?)
        }
        "HeapProfiler.startSampling" => HeapProfilerStartSampling(env.params()?),
        "HeapProfiler.stopSampling" => HeapProfilerStopSampling,
        "HeapProfiler.collectGarbage" => HeapProfilerCollectGarbage,
        "HeapProfiler.getObjectByHeapObjectId" => {
            HeapProfilerGetObjectByHeapObjectId(env.params()?)
        }
        "HeapProfiler.getHeapObjectId" => HeapProfilerGetHeapObjectId(env.params()?),

        "Profiler.start" => ProfilerStart,
        "Profiler.stop" => ProfilerStop,

        _ => Unknown,
    };

    Ok(Request {
        id: env.id,
        method: env.method,
        kind,
    })
}
