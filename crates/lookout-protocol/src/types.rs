//! CDP domain types shared by requests, responses and notifications.
//!
//! Field names follow the Chrome DevTools Protocol JSON spelling via
//! `rename_all = "camelCase"`; optional fields are omitted when unset.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The only execution context this adapter exposes.
pub const EXECUTION_CONTEXT_ID: i64 = 1;

// ---------------------------------------------------------------------------
// Runtime domain
// ---------------------------------------------------------------------------

/// Primary type tag of a [`RemoteObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteObjectType {
    #[default]
    Undefined,
    Object,
    Function,
    String,
    Number,
    Boolean,
    Symbol,
    Bigint,
}

/// Secondary type tag, only meaningful for `object` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteObjectSubtype {
    Array,
    Null,
    Regexp,
    Date,
    Map,
    Set,
    Error,
    Promise,
    Proxy,
}

/// Mirror of an engine value as seen by the client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: RemoteObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<RemoteObjectSubtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Inline JSON value for primitives and `returnByValue` results.
    /// An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    /// Primitive values that JSON cannot carry (`NaN`, `-0`, bigints).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Handle into the adapter's remote objects table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ObjectPreview>,
}

/// A field that is present, even as `null`, deserializes to `Some`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Bounded, shallow summary of an object's properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPreview {
    #[serde(rename = "type")]
    pub object_type: RemoteObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<RemoteObjectSubtype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// True when properties were left out of the preview.
    pub overflow: bool,
    pub properties: Vec<PropertyPreview>,
}

/// One entry of an [`ObjectPreview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPreview {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: RemoteObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<RemoteObjectSubtype>,
}

/// A property as returned by `Runtime.getProperties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writable: Option<bool>,
    pub configurable: bool,
    pub enumerable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_thrown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_own: Option<bool>,
}

/// A frame in a runtime stack trace (exception details).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFrame {
    pub function_name: String,
    pub script_id: String,
    pub url: String,
    pub line_number: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub call_frames: Vec<RuntimeCallFrame>,
}

/// Details of an exception thrown by evaluated or compiled code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub exception_id: i64,
    pub text: String,
    pub line_number: i64,
    pub column_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<StackTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_context_id: Option<i64>,
}

/// Argument passed to `Runtime.callFunctionOn`. At most one field is set;
/// none means `undefined`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    pub id: i64,
    pub origin: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Debugger domain
// ---------------------------------------------------------------------------

/// A 0-based position inside a script, as CDP counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Global,
    Local,
    Closure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub object: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A frame of the paused call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: Location,
    pub url: String,
    pub scope_chain: Vec<Scope>,
    pub this: RemoteObject,
}

/// Value of the `reason` field of `Debugger.paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PausedReason {
    Exception,
    Other,
}

// ---------------------------------------------------------------------------
// Notification payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
    pub script_id: String,
    pub url: String,
    pub start_line: i64,
    pub start_column: i64,
    pub end_line: i64,
    pub end_column: i64,
    pub execution_context_id: i64,
    pub hash: String,
    #[serde(rename = "sourceMapURL", skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
}

impl ScriptParsed {
    pub const METHOD: &'static str = "Debugger.scriptParsed";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paused {
    pub call_frames: Vec<CallFrame>,
    pub reason: PausedReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_breakpoints: Option<Vec<String>>,
}

impl Paused {
    pub const METHOD: &'static str = "Debugger.paused";
}

/// `Debugger.resumed` carries no params.
pub const RESUMED_METHOD: &str = "Debugger.resumed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
    #[serde(rename = "type")]
    pub call_type: String,
    pub args: Vec<RemoteObject>,
    pub execution_context_id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
}

impl ConsoleApiCalled {
    pub const METHOD: &'static str = "Runtime.consoleAPICalled";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextCreated {
    pub context: ExecutionContextDescription,
}

impl ExecutionContextCreated {
    pub const METHOD: &'static str = "Runtime.executionContextCreated";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddHeapSnapshotChunk {
    pub chunk: String,
}

impl AddHeapSnapshotChunk {
    pub const METHOD: &'static str = "HeapProfiler.addHeapSnapshotChunk";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeapSnapshotProgress {
    pub done: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
}

impl ReportHeapSnapshotProgress {
    pub const METHOD: &'static str = "HeapProfiler.reportHeapSnapshotProgress";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSeenObjectId {
    pub last_seen_object_id: u64,
    pub timestamp: f64,
}

impl LastSeenObjectId {
    pub const METHOD: &'static str = "HeapProfiler.lastSeenObjectId";
}

/// Flattened triplets of `(fragment index, object count, total size)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapStatsUpdate {
    pub stats_update: Vec<u64>,
}

impl HeapStatsUpdate {
    pub const METHOD: &'static str = "HeapProfiler.heapStatsUpdate";
}

// ---------------------------------------------------------------------------
// Result payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
    pub breakpoint_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResult {
    pub breakpoint_id: String,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInstrumentationBreakpointResult {
    pub breakpoint_id: String,
}

/// Result of `Runtime.evaluate`, `Runtime.callFunctionOn` and
/// `Debugger.evaluateOnCallFrame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
    pub result: Vec<PropertyDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileScriptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHeapUsageResult {
    pub used_size: f64,
    pub total_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLexicalScopeNamesResult {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObjectIdResult {
    pub heap_snapshot_object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectByHeapObjectIdResult {
    pub result: RemoteObject,
}

/// Result of `Profiler.stop` and `HeapProfiler.stopSampling`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResult {
    pub profile: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_object_omits_unset_fields() {
        let obj = RemoteObject {
            object_type: RemoteObjectType::Number,
            value: Some(json!(3)),
            ..RemoteObject::default()
        };
        let v = serde_json::to_value(&obj).unwrap();
        assert_eq!(v, json!({"type": "number", "value": 3}));
    }

    #[test]
    fn remote_object_null_subtype_serde() {
        let obj = RemoteObject {
            object_type: RemoteObjectType::Object,
            subtype: Some(RemoteObjectSubtype::Null),
            value: Some(Value::Null),
            ..RemoteObject::default()
        };
        let v = serde_json::to_value(&obj).unwrap();
        assert_eq!(v["subtype"], "null");
        assert!(v.get("value").is_some());
        let back: RemoteObject = serde_json::from_value(v).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn remote_object_absent_value_stays_none() {
        let back: RemoteObject = serde_json::from_value(json!({"type": "undefined"})).unwrap();
        assert_eq!(back.object_type, RemoteObjectType::Undefined);
        assert_eq!(back.value, None);

        let null: RemoteObject =
            serde_json::from_value(json!({"type": "object", "value": null})).unwrap();
        assert_eq!(null.value, Some(Value::Null));
    }

    #[test]
    fn script_parsed_uses_source_map_url_spelling() {
        let note = ScriptParsed {
            script_id: "3".into(),
            url: "main.js".into(),
            start_line: 0,
            start_column: 0,
            end_line: 0,
            end_column: 0,
            execution_context_id: EXECUTION_CONTEXT_ID,
            hash: String::new(),
            source_map_url: Some("main.js.map".into()),
        };
        let v = serde_json::to_value(&note).unwrap();
        assert_eq!(v["sourceMapURL"], "main.js.map");
        assert_eq!(v["scriptId"], "3");
        assert_eq!(v["executionContextId"], 1);
    }

    #[test]
    fn paused_reason_and_hit_breakpoints_serde() {
        let note = Paused {
            call_frames: vec![],
            reason: PausedReason::Other,
            data: None,
            hit_breakpoints: Some(vec!["virtualbreakpoint-1".into()]),
        };
        let v = serde_json::to_value(&note).unwrap();
        assert_eq!(v["reason"], "other");
        assert_eq!(v["hitBreakpoints"], json!(["virtualbreakpoint-1"]));
        assert!(v.get("data").is_none());
    }

    #[test]
    fn location_column_is_optional() {
        let loc: Location =
            serde_json::from_value(json!({"scriptId": "1", "lineNumber": 4})).unwrap();
        assert_eq!(loc.column_number, None);
        assert_eq!(loc.line_number, 4);
    }

    #[test]
    fn call_argument_accepts_each_form() {
        let by_value: CallArgument = serde_json::from_value(json!({"value": [1, 2]})).unwrap();
        assert_eq!(by_value.value, Some(json!([1, 2])));
        let by_id: CallArgument = serde_json::from_value(json!({"objectId": "7"})).unwrap();
        assert_eq!(by_id.object_id.as_deref(), Some("7"));
        let unserializable: CallArgument =
            serde_json::from_value(json!({"unserializableValue": "NaN"})).unwrap();
        assert_eq!(unserializable.unserializable_value.as_deref(), Some("NaN"));
    }
}
