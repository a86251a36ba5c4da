//! The dispatch pipeline.
//!
//! ```text
//! Received -> Authorized -> ParamsValidated -> BeforeHooksRun -> BodyExecuting -> Completed
//!     \______________\______________\_______________\_______________\-> Failed
//! ```
//!
//! Request errors raised in any stage become failure envelopes. Configuration errors and
//! untranslated foreign errors escape as [`DispatchError`].

use crate::authenticator::{check_access, resolve_access_rule, resolve_authenticator, AccessRule};
use crate::action::Action;
use crate::controller::Controller;
use crate::envelope::ResultEnvelope;
use crate::environment::Environment;
use crate::error::{ActionError, DispatchError, RequestError};
use crate::params::{validate_params, ParamSet};
use crate::registry::Registry;
use crate::request::RequestContext;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pipeline stage. A failing request is logged with the last stage it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Controller and action resolved; identity and access not yet checked.
    Received,
    /// Identity resolved and the access rule passed.
    Authorized,
    /// Parameters validated.
    ParamsValidated,
    /// Before-hooks finished.
    BeforeHooksRun,
    /// Running action bodies.
    BodyExecuting,
    /// Final value produced.
    Completed,
}

impl Stage {
    /// The stage that follows this one, `None` once completed.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::Authorized),
            Stage::Authorized => Some(Stage::ParamsValidated),
            Stage::ParamsValidated => Some(Stage::BeforeHooksRun),
            Stage::BeforeHooksRun => Some(Stage::BodyExecuting),
            Stage::BodyExecuting => Some(Stage::Completed),
            Stage::Completed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Authorized => "authorized",
            Stage::ParamsValidated => "params_validated",
            Stage::BeforeHooksRun => "before_hooks_run",
            Stage::BodyExecuting => "body_executing",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Run `controller#action` with raw `params` against `registry`.
pub fn dispatch(
    registry: &Arc<Registry>,
    controller: &str,
    action: &str,
    params: Value,
    request: RequestContext,
) -> Result<ResultEnvelope, DispatchError> {
    let started = Instant::now();
    let controller_def = registry
        .controller(controller)
        .cloned()
        .ok_or_else(|| DispatchError::UnknownController(controller.to_string()))?;
    let action_def = controller_def.action(action).cloned().ok_or_else(|| {
        DispatchError::UnknownAction { controller: controller.to_string(), action: action.to_string() }
    })?;

    let request_id = request.id().to_string();
    debug!(target: "lanyard::dispatch", request_id = %request_id, controller, action, "received");

    let mut env = Environment::for_action(
        registry.clone(),
        Arc::new(request),
        controller_def.clone(),
        action_def.clone(),
        ParamSet::from_value(params),
    );
    let mut stage = Stage::Received;
    let outcome = run(&mut env, registry, &controller_def, &action_def, &mut stage);
    let elapsed = started.elapsed().as_secs_f64();
    let (headers, flags) = env.into_side_channels();

    let failure = match outcome {
        Ok(data) => {
            info!(
                target: "lanyard::dispatch",
                request_id = %request_id, controller, action,
                status = "success", elapsed_secs = elapsed,
                "completed"
            );
            return Ok(ResultEnvelope::success(data, elapsed, flags, headers));
        }
        Err(ActionError::Request(err)) => err,
        Err(ActionError::Config(err)) => {
            error!(
                target: "lanyard::dispatch",
                request_id = %request_id, controller, action, %stage, error = %err,
                "configuration error"
            );
            return Err(DispatchError::Config(err));
        }
        Err(ActionError::External(err)) => match registry.translate_external(err.as_ref()) {
            Some(translated) => translated,
            None => {
                error!(
                    target: "lanyard::dispatch",
                    request_id = %request_id, controller, action, %stage, error = %err,
                    "unhandled external error"
                );
                return Err(DispatchError::Unhandled(err));
            }
        },
    };

    info!(
        target: "lanyard::dispatch",
        request_id = %request_id, controller, action, %stage,
        status = failure.status(), elapsed_secs = elapsed,
        "failed"
    );
    Ok(ResultEnvelope::failure(&failure, elapsed, flags, headers))
}

fn run(
    env: &mut Environment,
    registry: &Registry,
    controller: &Controller,
    action: &Action,
    stage: &mut Stage,
) -> Result<Value, ActionError> {
    let resolved = resolve_authenticator(registry, controller, action);
    if env.identity().is_none() {
        if let Some(auth) = resolved.authenticator() {
            if auth.has_lookup() {
                let identity = auth.lookup(env.request())?;
                env.set_identity(identity);
            }
        }
    }
    let rule = resolve_access_rule(controller, action);
    if !check_access(&resolved, rule, env)? {
        warn!(
            target: "lanyard::dispatch",
            request_id = env.request().id(),
            controller = controller.name(),
            action = action.name(),
            rule,
            "access denied"
        );
        let denial = resolved
            .authenticator()
            .and_then(|auth| auth.rule(rule))
            .map(AccessRule::denial)
            .unwrap_or_else(|| RequestError::access_denied("AccessDenied", "access denied"));
        return Err(denial.into());
    }
    advance(stage, env);

    validate_params(action.params(), env.params_mut())?;
    advance(stage, env);

    for hook in controller.hooks_for(action.name()) {
        hook.run(env)?;
    }
    advance(stage, env);

    advance(stage, env);
    let mut result = Value::Null;
    for body in action.bodies() {
        result = body(env, result)?;
    }
    advance(stage, env);
    Ok(result)
}

fn advance(stage: &mut Stage, env: &Environment) {
    if let Some(next) = stage.next() {
        debug!(target: "lanyard::dispatch", request_id = env.request().id(), stage = %next, "stage");
        *stage = next;
    }
}
