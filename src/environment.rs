//! Execution environment: everything caller-supplied logic can see during one request.
//!
//! One instance exists per request (plus cheap scoped copies during projection). Response
//! headers and flags written here never leak into other requests.

use crate::action::{Action, ReturnKind};
use crate::collection::{apply_filters, Collection, Pagination};
use crate::config::LanyardConfig;
use crate::controller::Controller;
use crate::error::{ActionError, ConfigError, RequestError};
use crate::params::ParamSet;
use crate::projection::{project, ProjectOptions};
use crate::registry::Registry;
use crate::request::RequestContext;
use crate::subject::{Field, SubjectRef};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flag set by [`Environment::paginate`].
pub const PAGINATED_FLAG: &str = "paginated";
/// Flag set by [`Environment::filter`].
pub const FILTERS_FLAG: &str = "filters";

/// Per-request bindings: registry, caller, parameters, current subject, response side channels.
#[derive(Clone)]
pub struct Environment {
    registry: Arc<Registry>,
    request: Arc<RequestContext>,
    identity: Option<Value>,
    controller: Option<Arc<Controller>>,
    action: Option<Arc<Action>>,
    params: ParamSet,
    subject: Option<SubjectRef>,
    headers: BTreeMap<String, String>,
    flags: Map<String, Value>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("request_id", &self.request.id())
            .field("identity", &self.identity)
            .field("controller", &self.controller.as_ref().map(|c| c.name().to_string()))
            .field("action", &self.action.as_ref().map(|a| a.name().to_string()))
            .field("params", &self.params)
            .field("subject", &self.subject.is_some())
            .field("flags", &self.flags)
            .finish()
    }
}

impl Environment {
    /// Environment outside any action, e.g. for projecting in a background job.
    pub fn new(registry: Arc<Registry>, request: RequestContext) -> Self {
        let identity = request.identity().cloned();
        Self {
            registry,
            request: Arc::new(request),
            identity,
            controller: None,
            action: None,
            params: ParamSet::new(),
            subject: None,
            headers: BTreeMap::new(),
            flags: Map::new(),
        }
    }

    /// Environment bound to an action; used by dispatch.
    pub(crate) fn for_action(
        registry: Arc<Registry>,
        request: Arc<RequestContext>,
        controller: Arc<Controller>,
        action: Arc<Action>,
        params: ParamSet,
    ) -> Self {
        let identity = request.identity().cloned();
        Self {
            registry,
            request,
            identity,
            controller: Some(controller),
            action: Some(action),
            params,
            subject: None,
            headers: BTreeMap::new(),
            flags: Map::new(),
        }
    }

    /// Copy bound to `subject`, as seen by attribute blocks and conditions.
    pub fn scoped(&self, subject: SubjectRef) -> Self {
        Self { subject: Some(subject), ..self.clone() }
    }

    pub(crate) fn set_identity(&mut self, identity: Option<Value>) {
        self.identity = identity;
    }

    pub(crate) fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    pub(crate) fn into_side_channels(self) -> (BTreeMap<String, String>, Map<String, Value>) {
        (self.headers, self.flags)
    }

    /// Registry the request runs against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registry settings.
    pub fn config(&self) -> &LanyardConfig {
        self.registry.config()
    }

    /// Raw request context.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Caller identity, if resolved.
    pub fn identity(&self) -> Option<&Value> {
        self.identity.as_ref()
    }

    /// Requested API version (at least 1).
    pub fn api_version(&self) -> u32 {
        self.request.api_version()
    }

    /// Raw request header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Controller being executed.
    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_deref()
    }

    /// Action being executed.
    pub fn action(&self) -> Option<&Action> {
        self.action.as_deref()
    }

    /// Validated parameters.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Shorthand for `params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Subject currently being projected.
    pub fn subject(&self) -> Option<&SubjectRef> {
        self.subject.as_ref()
    }

    /// Field of the current subject.
    pub fn field(&self, name: &str) -> Option<Field> {
        self.subject.as_ref()?.field(name)
    }

    /// Set a response header; delivered beside the body, never inside it.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Response headers set so far.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Set a flag reported in the envelope.
    pub fn set_flag(&mut self, name: impl Into<String>, value: Value) {
        self.flags.insert(name.into(), value);
    }

    /// Flag by name.
    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    /// Flags set so far.
    pub fn flags(&self) -> &Map<String, Value> {
        &self.flags
    }

    /// Project `subject` through the named entity.
    pub fn project(
        &self,
        entity: &str,
        subject: SubjectRef,
        options: &ProjectOptions,
    ) -> Result<Value, ActionError> {
        let definition = self
            .registry
            .entity(entity)
            .ok_or_else(|| ConfigError::UnknownEntity { name: entity.to_string() })?;
        project(self, definition, subject, options)
    }

    /// Options the action's return spec resolves to for this request.
    pub fn return_options(&self) -> Result<(String, ReturnKind, ProjectOptions), ActionError> {
        let action = self.action.as_deref();
        let spec = action.and_then(Action::returns).ok_or_else(|| ConfigError::MissingReturnSpec {
            action: action.map(|a| a.name().to_string()).unwrap_or_default(),
        })?;
        let options = spec.resolve_options(&self.params, self.config());
        Ok((spec.entity().to_string(), spec.kind(), options))
    }

    /// Project one subject through the action's return spec.
    pub fn render(&self, subject: SubjectRef) -> Result<Value, ActionError> {
        let (entity, _, options) = self.return_options()?;
        self.project(&entity, subject, &options)
    }

    /// Project every subject through the action's return spec.
    pub fn render_all<I>(&self, subjects: I) -> Result<Value, ActionError>
    where
        I: IntoIterator<Item = SubjectRef>,
    {
        let (entity, _, options) = self.return_options()?;
        subjects
            .into_iter()
            .map(|s| self.project(&entity, s, &options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Page through `collection`, recording the `paginated` flag and mapping each record.
    pub fn paginate<C, F>(
        &mut self,
        collection: C,
        max_per_page: usize,
        mut transform: F,
    ) -> Result<Value, ActionError>
    where
        C: Collection,
        F: FnMut(&Environment, C::Item) -> Result<Value, ActionError>,
    {
        let window = Pagination::resolve(
            &self.params,
            self.config(),
            collection.default_per_page(),
            max_per_page,
            collection.total_records(),
        );
        self.set_flag(PAGINATED_FLAG, window.to_value());
        collection
            .page(window.page, window.per_page)
            .into_iter()
            .map(|item| transform(self, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Narrow `collection` by the client's `filters` parameter and the action's declarations.
    pub fn filter<C: Collection>(&mut self, collection: C) -> Result<C, ActionError> {
        let empty = BTreeMap::new();
        let declared = self.action.as_deref().map(Action::filters).unwrap_or(&empty);
        let raw = self.params.get(&self.registry.config().filters_param);
        let (narrowed, flag) = apply_filters(collection, raw, declared)?;
        self.set_flag(FILTERS_FLAG, flag);
        Ok(narrowed)
    }

    /// Invoke a registered helper: controller-scoped first, then global.
    pub fn helper(&mut self, name: &str, args: &[Value]) -> Result<Value, ActionError> {
        let scope = self.controller.as_deref().map(Controller::name);
        let helper = self
            .registry
            .helper(scope, name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownHelper { name: name.to_string() })?;
        helper(self, args)
    }

    /// Build the `request-error` for a code from the action's error catalog.
    pub fn declared_error(&self, code: &str, data: Map<String, Value>) -> ActionError {
        let action = self.action.as_deref();
        match action.and_then(|a| a.errors().get(code)) {
            Some(spec) => RequestError::Structured {
                code: code.to_string(),
                message: spec.description().to_string(),
                data,
            }
            .into(),
            None => ConfigError::UnknownDeclaredError {
                action: action.map(|a| a.name().to_string()).unwrap_or_default(),
                code: code.to_string(),
            }
            .into(),
        }
    }
}
