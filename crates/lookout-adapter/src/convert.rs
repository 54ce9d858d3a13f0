//! Conversions from engine values and pause state into CDP types.
//!
//! Engine lines and columns are 1-based; CDP counts from 0. Every
//! conversion in this module takes care of the shift.

use std::sync::Mutex;

use lookout_engine::{
    format_number, CallFrameInfo, Engine, ObjectKind, SourceLocation, Value,
};
use lookout_protocol::{
    CallFrame, ExceptionDetails, Location, ObjectPreview, PropertyPreview, RemoteObject,
    RemoteObjectSubtype, RemoteObjectType, RuntimeCallFrame, Scope, ScopeType, StackTrace,
    EXECUTION_CONTEXT_ID,
};
use serde_json::json;

use crate::lock;
use crate::remote_objects::{RemoteObjectsTable, BACKTRACE_GROUP};

/// Properties shown in the preview of a plain object.
const PREVIEW_PROPERTIES: usize = 5;
/// Elements shown in the preview of an array.
const PREVIEW_ELEMENTS: usize = 100;
/// Nesting limit when inlining values as JSON.
const MAX_JSON_DEPTH: usize = 16;

/// How a value should be mirrored to the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectOptions {
    /// Inline objects as JSON instead of minting an id.
    pub by_value: bool,
    pub generate_preview: bool,
}

impl ObjectOptions {
    pub fn new(by_value: Option<bool>, generate_preview: Option<bool>) -> Self {
        Self {
            by_value: by_value.unwrap_or(false),
            generate_preview: generate_preview.unwrap_or(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

fn type_of(value: &Value) -> (RemoteObjectType, Option<RemoteObjectSubtype>) {
    match value {
        Value::Undefined => (RemoteObjectType::Undefined, None),
        Value::Null => (RemoteObjectType::Object, Some(RemoteObjectSubtype::Null)),
        Value::Bool(_) => (RemoteObjectType::Boolean, None),
        Value::Number(_) => (RemoteObjectType::Number, None),
        Value::String(_) => (RemoteObjectType::String, None),
        Value::BigInt(_) => (RemoteObjectType::Bigint, None),
        Value::Symbol(_) => (RemoteObjectType::Symbol, None),
        Value::Object(obj) => match obj.kind() {
            ObjectKind::Function => (RemoteObjectType::Function, None),
            ObjectKind::Array => (RemoteObjectType::Object, Some(RemoteObjectSubtype::Array)),
            ObjectKind::Error => (RemoteObjectType::Object, Some(RemoteObjectSubtype::Error)),
            ObjectKind::RegExp => (RemoteObjectType::Object, Some(RemoteObjectSubtype::Regexp)),
            ObjectKind::Date => (RemoteObjectType::Object, Some(RemoteObjectSubtype::Date)),
            ObjectKind::Plain => (RemoteObjectType::Object, None),
        },
    }
}

/// JSON form of a number, `None` for values JSON cannot carry.
fn number_json(n: f64) -> Option<serde_json::Value> {
    if !n.is_finite() || (n == 0.0 && n.is_sign_negative()) {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Some(json!(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(serde_json::Value::Number)
    }
}

/// Mirror `value` for the client, minting an id under `group` for
/// objects unless they are inlined by value.
pub fn remote_object(
    engine: &mut dyn Engine,
    objects: &Mutex<RemoteObjectsTable>,
    value: &Value,
    group: &str,
    options: ObjectOptions,
) -> RemoteObject {
    let (object_type, subtype) = type_of(value);
    let mut remote = RemoteObject {
        object_type,
        subtype,
        ..RemoteObject::default()
    };

    match value {
        Value::Undefined => {}
        Value::Null => remote.value = Some(serde_json::Value::Null),
        Value::Bool(b) => remote.value = Some(json!(b)),
        Value::Number(n) => {
            let text = format_number(*n);
            match number_json(*n) {
                Some(number) => remote.value = Some(number),
                None => remote.unserializable_value = Some(text.clone()),
            }
            remote.description = Some(text);
        }
        Value::String(s) => remote.value = Some(json!(s)),
        Value::BigInt(_) | Value::Symbol(_) => {
            let text = value.to_string();
            if matches!(value, Value::BigInt(_)) {
                remote.unserializable_value = Some(text.clone());
            }
            remote.description = Some(text);
        }
        Value::Object(obj) => {
            remote.class_name = Some(obj.class_name().to_string());
            remote.description = Some(obj.description().to_string());
            if options.by_value {
                remote.value = Some(json_value(engine, value, 0));
            } else {
                remote.object_id = Some(lock(objects).add_value(value.clone(), group));
                if options.generate_preview && object_type != RemoteObjectType::Function {
                    remote.preview = Some(preview(engine, value));
                }
            }
        }
    }
    remote
}

/// Plain JSON rendering of `value`; functions and `undefined` members
/// are left out, unrepresentable numbers become `null`.
pub fn json_value(engine: &mut dyn Engine, value: &Value, depth: usize) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null | Value::Symbol(_) => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Number(n) => number_json(*n).unwrap_or(serde_json::Value::Null),
        Value::String(s) => json!(s),
        Value::BigInt(digits) => json!(digits),
        Value::Object(obj) => {
            if depth >= MAX_JSON_DEPTH || obj.kind() == ObjectKind::Function {
                return serde_json::Value::Null;
            }
            let names = engine.own_property_names(value).unwrap_or_default();
            if obj.kind() == ObjectKind::Array {
                let items = names
                    .iter()
                    .filter(|name| name.parse::<usize>().is_ok())
                    .map(|name| {
                        let item = engine.get_property(value, name).unwrap_or_default();
                        json_value(engine, &item, depth + 1)
                    })
                    .collect();
                return serde_json::Value::Array(items);
            }
            let mut map = serde_json::Map::new();
            for name in names {
                let member = engine.get_property(value, &name).unwrap_or_default();
                if matches!(member, Value::Undefined) || member.is_function() {
                    continue;
                }
                let member = json_value(engine, &member, depth + 1);
                map.insert(name, member);
            }
            serde_json::Value::Object(map)
        }
    }
}

fn preview_text(value: &Value) -> Option<String> {
    match value {
        Value::Undefined => None,
        other => Some(other.to_string()),
    }
}

fn preview(engine: &mut dyn Engine, value: &Value) -> ObjectPreview {
    let (object_type, subtype) = type_of(value);
    let is_array = subtype == Some(RemoteObjectSubtype::Array);
    let limit = if is_array {
        PREVIEW_ELEMENTS
    } else {
        PREVIEW_PROPERTIES
    };
    let names: Vec<String> = engine
        .own_property_names(value)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| !(is_array && name == "length"))
        .collect();

    let properties = names
        .iter()
        .take(limit)
        .map(|name| {
            let member = engine.get_property(value, name).unwrap_or_default();
            let (object_type, subtype) = type_of(&member);
            PropertyPreview {
                name: name.clone(),
                object_type,
                value: preview_text(&member),
                subtype,
            }
        })
        .collect();

    ObjectPreview {
        object_type,
        subtype,
        description: value.as_object().map(|obj| obj.description().to_string()),
        overflow: names.len() > limit,
        properties,
    }
}

// ---------------------------------------------------------------------------
// Locations, frames and exceptions
// ---------------------------------------------------------------------------

/// CDP location of an engine position.
pub fn location(loc: &SourceLocation) -> Location {
    Location {
        script_id: loc.file_id.to_string(),
        line_number: (i64::from(loc.line) - 1).max(0),
        column_number: loc.column.map(|c| (i64::from(c) - 1).max(0)),
    }
}

fn scope_object(objects: &Mutex<RemoteObjectsTable>, frame: u32, scope: u32) -> RemoteObject {
    RemoteObject {
        object_type: RemoteObjectType::Object,
        class_name: Some("Object".into()),
        description: Some("Object".into()),
        object_id: Some(lock(objects).add_scope(frame, scope, BACKTRACE_GROUP)),
        ..RemoteObject::default()
    }
}

/// Call frames of the paused stack, innermost first. Every handle is
/// minted in the backtrace group.
///
/// Frames with more than one lexical scope get a `local` scope followed
/// by `closure` scopes; the outermost scope is always shown as `global`,
/// backed by the global object.
pub fn call_frames(
    engine: &mut dyn Engine,
    objects: &Mutex<RemoteObjectsTable>,
    stack: &[CallFrameInfo],
) -> Vec<CallFrame> {
    let mut frames = Vec::with_capacity(stack.len());
    for (index, info) in stack.iter().enumerate() {
        let index = index as u32;
        let this = engine.this_info(index);
        let this = remote_object(engine, objects, &this, BACKTRACE_GROUP, ObjectOptions::default());

        let scopes = engine.lexical_info(index).scopes_count();
        let mut scope_chain = Vec::new();
        if scopes > 1 {
            for scope in 0..scopes - 1 {
                scope_chain.push(Scope {
                    scope_type: if scope == 0 {
                        ScopeType::Local
                    } else {
                        ScopeType::Closure
                    },
                    object: scope_object(objects, index, scope),
                    name: None,
                });
            }
        }
        let global = engine.global();
        scope_chain.push(Scope {
            scope_type: ScopeType::Global,
            object: remote_object(engine, objects, &global, BACKTRACE_GROUP, ObjectOptions::default()),
            name: None,
        });

        frames.push(CallFrame {
            call_frame_id: index.to_string(),
            function_name: info.function_name.clone(),
            location: location(&info.location),
            url: info.location.file_name.clone(),
            scope_chain,
            this,
        });
    }
    frames
}

fn stack_trace(stack: &[CallFrameInfo]) -> StackTrace {
    StackTrace {
        call_frames: stack
            .iter()
            .map(|frame| {
                let loc = location(&frame.location);
                RuntimeCallFrame {
                    function_name: frame.function_name.clone(),
                    script_id: loc.script_id,
                    url: frame.location.file_name.clone(),
                    line_number: loc.line_number,
                    column_number: loc.column_number.unwrap_or(0),
                }
            })
            .collect(),
    }
}

/// Exception details for a value thrown by evaluated code.
pub fn exception_details(
    engine: &mut dyn Engine,
    objects: &Mutex<RemoteObjectsTable>,
    details: &lookout_engine::ExceptionDetails,
    thrown: &Value,
    group: &str,
) -> ExceptionDetails {
    let loc = location(&details.location);
    ExceptionDetails {
        exception_id: 0,
        text: details.text.clone(),
        line_number: loc.line_number,
        column_number: loc.column_number.unwrap_or(0),
        script_id: Some(loc.script_id),
        url: Some(details.location.file_name.clone()),
        stack_trace: Some(stack_trace(&details.stack)),
        exception: Some(remote_object(engine, objects, thrown, group, ObjectOptions::default())),
        execution_context_id: Some(EXECUTION_CONTEXT_ID),
    }
}
