//! `Runtime` domain handlers.

use lookout_engine::{EngineError, EvalResult, Value};
use lookout_protocol::request::{
    CallFunctionOnParams, CompileScriptParams, EvaluateParams, GetPropertiesParams,
    GlobalLexicalScopeNamesParams,
};
use lookout_protocol::{
    CallArgument, CompileScriptResult, ExceptionDetails, ExecutionContextCreated,
    ExecutionContextDescription, GetHeapUsageResult, GetPropertiesResult,
    GlobalLexicalScopeNamesResult, PropertyDescriptor, RemoteObject, Response,
    EXECUTION_CONTEXT_ID,
};

use crate::console::{discarded_warning, ConsoleMessage};
use crate::convert::ObjectOptions;
use crate::error::AdapterError;
use crate::handler::Shared;
use crate::lock;
use crate::pause::PauseContext;
use crate::queues::{Execution, PendingEval};
use crate::remote_objects::DEFAULT_GROUP;

/// Prefix of script ids minted by `Runtime.compileScript`.
const USER_SCRIPT_PREFIX: &str = "userScript";

fn check_context(context_id: Option<i64>) -> Result<(), AdapterError> {
    match context_id {
        Some(id) if id != EXECUTION_CONTEXT_ID => Err(AdapterError::UnknownExecutionContext(id)),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Engine value for a CDP `unserializableValue`.
fn unserializable(text: &str) -> Result<Value, AdapterError> {
    match text {
        "NaN" => Ok(Value::Number(f64::NAN)),
        "Infinity" => Ok(Value::Number(f64::INFINITY)),
        "-Infinity" => Ok(Value::Number(f64::NEG_INFINITY)),
        "-0" => Ok(Value::Number(-0.0)),
        _ => {
            let digits = text
                .strip_suffix('n')
                .filter(|d| {
                    let unsigned = d.strip_prefix('-').unwrap_or(d);
                    !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit())
                })
                .ok_or_else(|| AdapterError::InvalidUnserializableValue(text.to_string()))?;
            Ok(Value::BigInt(digits.to_string()))
        }
    }
}

/// Build an engine value from plain JSON.
fn from_json(ctx: &mut PauseContext<'_>, json: &serde_json::Value) -> Result<Value, EngineError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            let array = ctx.engine.create_object();
            for (index, item) in items.iter().enumerate() {
                let value = from_json(ctx, item)?;
                ctx.engine.set_property(&array, &index.to_string(), value)?;
            }
            ctx.engine
                .set_property(&array, "length", Value::Number(items.len() as f64))?;
            array
        }
        serde_json::Value::Object(fields) => {
            let object = ctx.engine.create_object();
            for (name, field) in fields {
                let value = from_json(ctx, field)?;
                ctx.engine.set_property(&object, name, value)?;
            }
            object
        }
    })
}

fn argument_value(ctx: &mut PauseContext<'_>, arg: &CallArgument) -> Result<Value, AdapterError> {
    if let Some(object_id) = &arg.object_id {
        ctx.lookup_value(object_id)
    } else if let Some(json) = &arg.value {
        Ok(from_json(ctx, json)?)
    } else if let Some(text) = &arg.unserializable_value {
        unserializable(text)
    } else {
        Ok(Value::Undefined)
    }
}

/// Call the evaluated function declaration with the requested receiver
/// and arguments.
fn call_declared_function(
    ctx: &mut PauseContext<'_>,
    function: Value,
    object_id: Option<&str>,
    arguments: &[CallArgument],
) -> Result<EvalResult, AdapterError> {
    let this = match object_id {
        Some(id) => ctx.lookup_value(id)?,
        None => ctx.engine.global(),
    };
    let args = arguments
        .iter()
        .map(|arg| argument_value(ctx, arg))
        .collect::<Result<Vec<_>, _>>()?;

    match ctx.engine.call(&function, &this, &args) {
        Ok(value) => Ok(EvalResult::value(value)),
        Err(EngineError::Thrown(exception)) => {
            Ok(EvalResult::thrown(exception.value, exception.details))
        }
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn scope_properties(
    ctx: &mut PauseContext<'_>,
    frame: u32,
    scope: u32,
    group: &str,
    options: ObjectOptions,
) -> Vec<PropertyDescriptor> {
    let mut result = Vec::new();
    let variable = |name: String, value: Option<RemoteObject>| {
        PropertyDescriptor {
            name,
            value,
            writable: None,
            configurable: false,
            enumerable: true,
            was_thrown: None,
            is_own: None,
        }
    };

    if scope == 0 {
        let this = ctx.engine.this_info(frame);
        let remote = ctx.remote_object(&this, group, options);
        result.push(variable("this".to_string(), Some(remote)));
    }
    let count = ctx.engine.lexical_info(frame).variables_in_scope(scope);
    for index in 0..count {
        if let Some(info) = ctx.engine.variable_info(frame, scope, index) {
            let remote = ctx.remote_object(&info.value, group, options);
            result.push(variable(info.name, Some(remote)));
        }
    }
    result
}

fn value_properties(
    ctx: &mut PauseContext<'_>,
    value: &Value,
    group: &str,
    own_properties: bool,
    options: ObjectOptions,
) -> Result<Vec<PropertyDescriptor>, AdapterError> {
    if !matches!(value, Value::Object(_)) {
        return Ok(Vec::new());
    }
    let property = |name: String, value: RemoteObject, was_thrown: bool| {
        PropertyDescriptor {
            name,
            value: Some(value),
            writable: Some(true),
            configurable: true,
            enumerable: true,
            was_thrown: was_thrown.then_some(true),
            is_own: Some(true),
        }
    };

    let mut result = Vec::new();
    for name in ctx.engine.own_property_names(value)? {
        let (property_value, thrown) = match ctx.engine.get_property(value, &name) {
            Ok(v) => (v, false),
            Err(err) => {
                tracing::debug!(property = %name, error = %err, "property read failed");
                (Value::String("(Exception)".to_string()), true)
            }
        };
        let remote = ctx.remote_object(&property_value, group, options);
        result.push(property(name, remote, thrown));
    }

    if own_properties {
        let proto = ctx.engine.prototype_of(value)?;
        if proto != Value::Null {
            let remote = ctx.remote_object(&proto, group, options);
            let mut descriptor = property("__proto__".to_string(), remote, false);
            descriptor.enumerable = false;
            result.push(descriptor);
        }
    }
    Ok(result)
}

impl Shared {
    pub(crate) fn runtime_enable(&self, id: i64) {
        self.enqueue_func(move |ctx| {
            let (messages, discarded) = {
                let mut console = lock(&ctx.shared.console);
                console.runtime_enabled = true;
                console.buffer.take()
            };
            ctx.shared.respond_ok(id);
            ctx.shared.notify(
                ExecutionContextCreated::METHOD,
                &ExecutionContextCreated {
                    context: ExecutionContextDescription {
                        id: EXECUTION_CONTEXT_ID,
                        origin: String::new(),
                        name: ctx.shared.options.title.clone(),
                    },
                },
            );

            if discarded > 0 {
                tracing::warn!(discarded, "console messages were discarded before Runtime.enable");
                let mut warning = ConsoleMessage::now(
                    "warning",
                    vec![Value::String(discarded_warning(discarded))],
                );
                if let Some(oldest) = messages.first() {
                    warning.timestamp = oldest.timestamp - 0.1;
                }
                ctx.shared.send_console_message(ctx.engine, warning);
            }
            for message in messages {
                ctx.shared.send_console_message(ctx.engine, message);
            }
        });
    }

    pub(crate) fn runtime_disable(&self, id: i64) {
        self.enqueue_func(move |ctx| {
            lock(&ctx.shared.console).runtime_enabled = false;
            ctx.shared.respond_ok(id);
        });
    }

    pub(crate) fn evaluate(&self, id: i64, params: EvaluateParams) -> Result<(), AdapterError> {
        check_context(params.context_id)?;
        self.enqueue_eval(PendingEval {
            id,
            frame_index: 0,
            expression: params.expression,
            object_group: params
                .object_group
                .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            options: ObjectOptions::new(params.return_by_value, params.generate_preview),
            on_complete: None,
        });
        Ok(())
    }

    pub(crate) fn call_function_on(
        &self,
        id: i64,
        params: CallFunctionOnParams,
    ) -> Result<(), AdapterError> {
        if params.object_id.is_some() == params.execution_context_id.is_some() {
            return Err(AdapterError::AmbiguousCallTarget);
        }
        check_context(params.execution_context_id)?;

        let object_id = params.object_id;
        let arguments = params.arguments.unwrap_or_default();
        self.enqueue_eval(PendingEval {
            id,
            frame_index: 0,
            expression: format!("({})", params.function_declaration),
            object_group: params
                .object_group
                .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            options: ObjectOptions::new(params.return_by_value, params.generate_preview),
            on_complete: Some(Box::new(move |ctx: &mut PauseContext<'_>, declared: EvalResult| {
                call_declared_function(ctx, declared.value, object_id.as_deref(), &arguments)
            })),
        });
        Ok(())
    }

    pub(crate) fn compile_script(
        &self,
        id: i64,
        params: CompileScriptParams,
    ) -> Result<(), AdapterError> {
        check_context(params.execution_context_id)?;
        self.enqueue_request(id, move |ctx| {
            let result = match ctx.engine.prepare_script(&params.expression, &params.source_url) {
                Ok(prepared) => {
                    let script_id = params.persist_script.then(|| {
                        let script_id =
                            format!("{USER_SCRIPT_PREFIX}{}", ctx.state.prepared_scripts.len());
                        ctx.state.prepared_scripts.push(prepared);
                        script_id
                    });
                    CompileScriptResult {
                        script_id,
                        exception_details: None,
                    }
                }
                Err(err) => {
                    let line = match &err {
                        EngineError::Syntax { line, .. } => i64::from(*line) - 1,
                        _ => 0,
                    };
                    CompileScriptResult {
                        script_id: None,
                        exception_details: Some(ExceptionDetails {
                            text: err.to_string(),
                            line_number: line.max(0),
                            url: Some(params.source_url.clone()),
                            execution_context_id: Some(EXECUTION_CONTEXT_ID),
                            ..ExceptionDetails::default()
                        }),
                    }
                }
            };
            Ok(Response::with_result(id, &result))
        });
        Ok(())
    }

    pub(crate) fn get_properties(&self, id: i64, params: GetPropertiesParams) {
        self.enqueue_request(id, move |ctx| {
            let (group, scope, value) = {
                let objects = lock(&ctx.shared.objects);
                (
                    objects.object_group(&params.object_id).to_string(),
                    objects.get_scope(&params.object_id),
                    objects.get_value(&params.object_id).cloned(),
                )
            };
            let options = ObjectOptions::new(None, params.generate_preview);
            let result = match (scope, value) {
                (Some((frame, scope)), _) => scope_properties(ctx, frame, scope, &group, options),
                (None, Some(value)) => value_properties(
                    ctx,
                    &value,
                    &group,
                    params.own_properties.unwrap_or(true),
                    options,
                )?,
                (None, None) => return Err(AdapterError::ObjectNotAvailable),
            };
            Ok(Response::with_result(
                id,
                &GetPropertiesResult {
                    result,
                    exception_details: None,
                },
            ))
        });
    }

    pub(crate) fn get_heap_usage(&self, id: i64) {
        self.enqueue_request(id, move |ctx| {
            let usage = ctx.engine.instrumentation().heap_usage();
            Ok(Response::with_result(
                id,
                &GetHeapUsageResult {
                    used_size: usage.used_size as f64,
                    total_size: usage.total_size as f64,
                },
            ))
        });
    }

    pub(crate) fn global_lexical_scope_names(
        &self,
        id: i64,
        params: GlobalLexicalScopeNamesParams,
    ) -> Result<(), AdapterError> {
        check_context(params.execution_context_id)?;
        self.enqueue_request(id, move |ctx| {
            let lexical = ctx.engine.lexical_info(0);
            let names = match lexical.scopes_count().checked_sub(1) {
                Some(global_scope) => (0..lexical.variables_in_scope(global_scope))
                    .filter_map(|index| ctx.engine.variable_info(0, global_scope, index))
                    .map(|info| info.name)
                    .filter(|name| !name.is_empty() && !name.starts_with('?'))
                    .collect(),
                None => Vec::new(),
            };
            Ok(Response::with_result(
                id,
                &GlobalLexicalScopeNamesResult { names },
            ))
        });
        Ok(())
    }

    pub(crate) fn run_if_waiting_for_debugger(&self, id: i64) {
        if self.queues.with(|q| q.awaiting_debugger_on_start) {
            self.enqueue_execution(id, Execution::Running);
        } else {
            self.respond_ok(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_context_check() {
        assert!(check_context(None).is_ok());
        assert!(check_context(Some(EXECUTION_CONTEXT_ID)).is_ok());
        assert_eq!(
            check_context(Some(7)),
            Err(AdapterError::UnknownExecutionContext(7))
        );
    }

    #[test]
    fn runtime_unserializable_numbers() {
        assert!(matches!(unserializable("NaN"), Ok(Value::Number(n)) if n.is_nan()));
        assert_eq!(unserializable("Infinity"), Ok(Value::Number(f64::INFINITY)));
        assert_eq!(
            unserializable("-Infinity"),
            Ok(Value::Number(f64::NEG_INFINITY))
        );
        let Ok(Value::Number(zero)) = unserializable("-0") else {
            panic!("expected a number");
        };
        assert!(zero == 0.0 && zero.is_sign_negative());
    }

    #[test]
    fn runtime_unserializable_bigint() {
        assert_eq!(
            unserializable("12345678901234567890n"),
            Ok(Value::BigInt("12345678901234567890".into()))
        );
        assert_eq!(unserializable("-3n"), Ok(Value::BigInt("-3".into())));
    }

    #[test]
    fn runtime_unserializable_rejects_garbage() {
        for text in ["n", "12", "1.5n", "abc", ""] {
            assert_eq!(
                unserializable(text),
                Err(AdapterError::InvalidUnserializableValue(text.to_string())),
                "{text}"
            );
        }
    }
}
