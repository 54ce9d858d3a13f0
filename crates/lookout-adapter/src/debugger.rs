//! `Debugger` domain handlers.
//!
//! Engine-touching work is queued for the pause callback; requests that
//! only consult adapter state (virtual breakpoints, the active flag) are
//! answered on the calling thread.

use std::sync::atomic::Ordering;

use lookout_engine::{BreakpointId, PauseOnThrowMode, SourceLocation};
use lookout_protocol::request::{
    EvaluateOnCallFrameParams, RemoveBreakpointParams, SetBreakpointByUrlParams,
    SetBreakpointParams, SetBreakpointsActiveParams, SetInstrumentationBreakpointParams,
    SetPauseOnExceptionsParams,
};
use lookout_protocol::{
    Response, SetBreakpointByUrlResult, SetBreakpointResult, SetInstrumentationBreakpointResult,
};
use regex::Regex;

use crate::convert::{self, ObjectOptions};
use crate::error::AdapterError;
use crate::handler::Shared;
use crate::lock;
use crate::pause::PauseContext;
use crate::queues::PendingEval;
use crate::remote_objects::BACKTRACE_GROUP;
use crate::virtual_breakpoints::{is_virtual_id, BEFORE_SCRIPT_WITH_SOURCE_MAP};

/// Place a native breakpoint and describe where it landed.
fn place_breakpoint(
    ctx: &mut PauseContext<'_>,
    location: SourceLocation,
    condition: Option<&str>,
) -> Result<(BreakpointId, Option<SourceLocation>), AdapterError> {
    let id = ctx
        .engine
        .set_breakpoint(location)
        .ok_or(AdapterError::BreakpointNotSet)?;
    if let Some(condition) = condition.filter(|c| !c.is_empty()) {
        ctx.engine.set_breakpoint_condition(id, condition);
    }
    let resolved = ctx
        .engine
        .breakpoint_info(id)
        .and_then(|info| info.resolved_location);
    tracing::debug!(id, resolved = resolved.is_some(), "breakpoint set");
    Ok((id, resolved))
}

/// Engine (1-based) position for a 0-based CDP line or column.
///
/// Negative input clamps to the first position.
fn engine_position(zero_based: i64) -> Result<u32, AdapterError> {
    let one_based = zero_based
        .checked_add(1)
        .ok_or(AdapterError::InvalidLocation(zero_based))?
        .max(1);
    u32::try_from(one_based).map_err(|_| AdapterError::InvalidLocation(zero_based))
}

/// Which script a `setBreakpointByUrl` request targets.
enum UrlTarget {
    Exact(String),
    Pattern(Regex),
}

impl UrlTarget {
    fn from_params(params: &SetBreakpointByUrlParams) -> Result<Self, AdapterError> {
        if let Some(url) = &params.url {
            return Ok(UrlTarget::Exact(url.clone()));
        }
        let pattern = params.url_regex.as_deref().ok_or(AdapterError::MissingUrl)?;
        Regex::new(&format!("^(?:{pattern})$"))
            .map(UrlTarget::Pattern)
            .map_err(|e| AdapterError::InvalidUrlRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }
}

impl Shared {
    pub(crate) fn set_breakpoint(
        &self,
        id: i64,
        params: SetBreakpointParams,
    ) -> Result<(), AdapterError> {
        let script_id = &params.location.script_id;
        let file_id: u32 = script_id
            .parse()
            .map_err(|_| AdapterError::InvalidScriptId(script_id.clone()))?;
        let location = SourceLocation {
            file_id,
            file_name: String::new(),
            line: engine_position(params.location.line_number)?,
            column: params
                .location
                .column_number
                .map(engine_position)
                .transpose()?,
        };

        self.enqueue_request(id, move |ctx| {
            let (breakpoint, resolved) =
                place_breakpoint(ctx, location, params.condition.as_deref())?;
            ctx.shared.breakpoints_active.store(true, Ordering::SeqCst);
            Ok(Response::with_result(
                id,
                &SetBreakpointResult {
                    breakpoint_id: breakpoint.to_string(),
                    actual_location: resolved.as_ref().map(convert::location),
                },
            ))
        });
        Ok(())
    }

    pub(crate) fn set_breakpoint_by_url(
        &self,
        id: i64,
        params: SetBreakpointByUrlParams,
    ) -> Result<(), AdapterError> {
        let target = UrlTarget::from_params(&params)?;
        let line = engine_position(params.line_number)?;
        let column = params
            .column_number
            .filter(|c| *c > 0)
            .map(engine_position)
            .transpose()?;

        self.enqueue_request(id, move |ctx| {
            let (file_id, file_name) = match target {
                UrlTarget::Exact(url) => (ctx.state.scripts.id_for_name(&url).unwrap_or(0), url),
                UrlTarget::Pattern(regex) => {
                    let name = ctx
                        .state
                        .scripts
                        .names()
                        .find(|name| regex.is_match(name))
                        .map(str::to_string)
                        .ok_or_else(|| {
                            AdapterError::NoScriptMatches(
                                params.url_regex.clone().unwrap_or_default(),
                            )
                        })?;
                    (ctx.state.scripts.id_for_name(&name).unwrap_or(0), name)
                }
            };
            let location = SourceLocation {
                file_id,
                file_name,
                line,
                column,
            };
            let (breakpoint, resolved) =
                place_breakpoint(ctx, location, params.condition.as_deref())?;
            Ok(Response::with_result(
                id,
                &SetBreakpointByUrlResult {
                    breakpoint_id: breakpoint.to_string(),
                    locations: resolved.iter().map(convert::location).collect(),
                },
            ))
        });
        Ok(())
    }

    pub(crate) fn remove_breakpoint(
        &self,
        id: i64,
        params: RemoveBreakpointParams,
    ) -> Result<(), AdapterError> {
        let breakpoint_id = params.breakpoint_id;
        if is_virtual_id(&breakpoint_id) {
            if !lock(&self.virtual_breakpoints).remove(&breakpoint_id) {
                return Err(AdapterError::UnknownBreakpoint(breakpoint_id));
            }
            self.respond_ok(id);
            return Ok(());
        }

        let native: BreakpointId = breakpoint_id
            .parse()
            .map_err(|_| AdapterError::UnknownBreakpoint(breakpoint_id.clone()))?;
        self.enqueue_request(id, move |ctx| {
            ctx.engine.delete_breakpoint(native);
            Ok(Response::ok(id))
        });
        Ok(())
    }

    pub(crate) fn set_breakpoints_active(&self, id: i64, params: SetBreakpointsActiveParams) {
        self.breakpoints_active.store(params.active, Ordering::SeqCst);
        tracing::debug!(active = params.active, "breakpoints active");
        self.respond_ok(id);
    }

    pub(crate) fn set_instrumentation_breakpoint(
        &self,
        id: i64,
        params: SetInstrumentationBreakpointParams,
    ) -> Result<(), AdapterError> {
        if params.instrumentation != BEFORE_SCRIPT_WITH_SOURCE_MAP {
            return Err(AdapterError::UnknownInstrumentation(params.instrumentation));
        }
        let breakpoint_id = lock(&self.virtual_breakpoints).create(&params.instrumentation);
        self.respond(Response::with_result(
            id,
            &SetInstrumentationBreakpointResult { breakpoint_id },
        ));
        Ok(())
    }

    pub(crate) fn set_pause_on_exceptions(
        &self,
        id: i64,
        params: SetPauseOnExceptionsParams,
    ) -> Result<(), AdapterError> {
        let mode = match params.state.as_str() {
            "none" => PauseOnThrowMode::None,
            "all" => PauseOnThrowMode::All,
            "uncaught" => PauseOnThrowMode::Uncaught,
            _ => return Err(AdapterError::UnknownPauseOnExceptionState(params.state)),
        };
        self.enqueue_request(id, move |ctx| {
            ctx.engine.set_pause_on_throw_mode(mode);
            Ok(Response::ok(id))
        });
        Ok(())
    }

    pub(crate) fn evaluate_on_call_frame(
        &self,
        id: i64,
        params: EvaluateOnCallFrameParams,
    ) -> Result<(), AdapterError> {
        let frame_index: u32 = params
            .call_frame_id
            .parse()
            .map_err(|_| AdapterError::InvalidCallFrameId(params.call_frame_id.clone()))?;
        self.enqueue_eval(PendingEval {
            id,
            frame_index,
            expression: params.expression,
            object_group: params
                .object_group
                .unwrap_or_else(|| BACKTRACE_GROUP.to_string()),
            options: ObjectOptions::new(params.return_by_value, params.generate_preview),
            on_complete: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_url(url: Option<&str>, url_regex: Option<&str>) -> SetBreakpointByUrlParams {
        SetBreakpointByUrlParams {
            line_number: 0,
            url: url.map(str::to_string),
            url_regex: url_regex.map(str::to_string),
            column_number: None,
            condition: None,
        }
    }

    #[test]
    fn debugger_url_target_prefers_url() {
        let target = UrlTarget::from_params(&by_url(Some("a.js"), Some("b.*"))).unwrap();
        assert!(matches!(target, UrlTarget::Exact(url) if url == "a.js"));
    }

    #[test]
    fn debugger_url_target_regex_matches_whole_name() {
        let UrlTarget::Pattern(regex) =
            UrlTarget::from_params(&by_url(None, Some("lib/.*\\.js"))).unwrap()
        else {
            panic!("expected a pattern");
        };
        assert!(regex.is_match("lib/x.js"));
        assert!(!regex.is_match("src/lib/x.js"));
        assert!(!regex.is_match("lib/x.jsx"));
    }

    #[test]
    fn debugger_url_target_requires_url_or_regex() {
        assert!(matches!(
            UrlTarget::from_params(&by_url(None, None)),
            Err(AdapterError::MissingUrl)
        ));
    }

    #[test]
    fn debugger_url_target_rejects_bad_regex() {
        let err = UrlTarget::from_params(&by_url(None, Some("("))).err().unwrap();
        assert!(matches!(err, AdapterError::InvalidUrlRegex { pattern, .. } if pattern == "("));
    }

    #[test]
    fn debugger_engine_position_shifts_and_clamps() {
        assert_eq!(engine_position(0), Ok(1));
        assert_eq!(engine_position(4), Ok(5));
        assert_eq!(engine_position(-3), Ok(1));
        assert_eq!(engine_position(i64::from(u32::MAX) - 1), Ok(u32::MAX));
    }

    #[test]
    fn debugger_engine_position_rejects_out_of_range() {
        assert_eq!(
            engine_position(i64::MAX),
            Err(AdapterError::InvalidLocation(i64::MAX))
        );
        assert_eq!(
            engine_position(4_294_967_297),
            Err(AdapterError::InvalidLocation(4_294_967_297))
        );
    }
}
