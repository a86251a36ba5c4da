//! Action definitions and the builder used to declare them.

use crate::config::LanyardConfig;
use crate::environment::Environment;
use crate::error::{ActionError, ConfigError};
use crate::filter::FilterOperator;
use crate::params::{coerce_bool, ParamSet, ParamSpec};
use crate::projection::{ExpansionSelection, ProjectOptions};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Action body. Receives the previous body's return value (`null` for the first).
pub type BodyFn = Arc<dyn Fn(&mut Environment, Value) -> Result<Value, ActionError> + Send + Sync>;
/// Reusable declaration fragment applied to an action builder.
pub type Fragment = Arc<dyn Fn(&mut ActionBuilder) + Send + Sync>;
/// Type-erased custom filter block; see [`ActionBuilder::filterable_with`].
pub type FilterBlock = Arc<
    dyn Fn(FilterOperator, &Value, Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, ActionError>
        + Send
        + Sync,
>;

/// Declared error in an action's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSpec {
    description: String,
    attributes: Vec<(String, String)>,
}

impl ErrorSpec {
    /// Error with a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), attributes: Vec::new() }
    }

    /// Document an extra payload attribute.
    pub fn attribute(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.attributes.push((name.into(), description.into()));
        self
    }

    /// Description reported as the error message.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Documented payload attributes.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }
}

/// Shape of an action's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// A single projected object.
    Object,
    /// A list of projected objects.
    Array,
}

/// How much control the client has over expansions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExpansionPolicy {
    /// The declared selection is fixed.
    #[default]
    Disallowed,
    /// The client may select any expansion.
    Any,
    /// The client may select from this list only.
    Only(Vec<String>),
}

/// Client-side control over the disclosure of an action's return value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paramable {
    full: bool,
    expansions: ExpansionPolicy,
}

impl Paramable {
    /// No client control.
    pub fn none() -> Self {
        Self::default()
    }

    /// Full toggle and free expansion selection.
    pub fn all() -> Self {
        Self { full: true, expansions: ExpansionPolicy::Any }
    }

    /// Let the client toggle full detail.
    pub fn allow_full(mut self) -> Self {
        self.full = true;
        self
    }

    /// Let the client select any expansion.
    pub fn allow_expansions(mut self) -> Self {
        self.expansions = ExpansionPolicy::Any;
        self
    }

    /// Let the client select expansions from a fixed list.
    pub fn allow_expansions_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expansions = ExpansionPolicy::Only(names.into_iter().map(Into::into).collect());
        self
    }

    /// May the caller toggle full detail?
    pub fn can_change_full(&self) -> bool {
        self.full
    }

    /// May the caller select expansions?
    pub fn can_change_expansions(&self) -> bool {
        !matches!(self.expansions, ExpansionPolicy::Disallowed)
    }

    /// Expansion policy.
    pub fn expansion_policy(&self) -> &ExpansionPolicy {
        &self.expansions
    }
}

/// Declared return value of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSpec {
    kind: ReturnKind,
    entity: String,
    options: ProjectOptions,
    paramable: Paramable,
    description: Option<String>,
}

impl ReturnSpec {
    /// Returns one object projected through `entity`.
    pub fn object(entity: impl Into<String>) -> Self {
        Self::new(ReturnKind::Object, entity.into())
    }

    /// Returns a list of objects projected through `entity`.
    pub fn array(entity: impl Into<String>) -> Self {
        Self::new(ReturnKind::Array, entity.into())
    }

    fn new(kind: ReturnKind, entity: String) -> Self {
        Self {
            kind,
            entity,
            options: ProjectOptions::default(),
            paramable: Paramable::default(),
            description: None,
        }
    }

    /// Static projection options used when the client does not override them.
    pub fn options(mut self, options: ProjectOptions) -> Self {
        self.options = options;
        self
    }

    /// Client control policy.
    pub fn paramable(mut self, paramable: Paramable) -> Self {
        self.paramable = paramable;
        self
    }

    /// Documentation text.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Result shape.
    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    /// Entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Client control policy.
    pub fn paramable_policy(&self) -> &Paramable {
        &self.paramable
    }

    /// Static options before client overrides.
    pub fn static_options(&self) -> &ProjectOptions {
        &self.options
    }

    /// Apply allowed client overrides (`_full`, `_expansions`) to the static options.
    pub fn resolve_options(&self, params: &ParamSet, config: &LanyardConfig) -> ProjectOptions {
        let mut options = self.options.clone();
        if self.paramable.full {
            if let Some(flag) = params.get(&config.full_param).and_then(coerce_bool) {
                options.full = flag;
            }
        }
        let requested = params.get(&config.expansions_param).and_then(ExpansionSelection::from_client);
        match (&self.paramable.expansions, requested) {
            (ExpansionPolicy::Any, Some(selection)) => options.expansions = selection,
            (ExpansionPolicy::Only(allowed), Some(selection)) => {
                options.expansions = selection.restrict_to(allowed)
            }
            _ => {}
        }
        options
    }
}

/// A filterable attribute.
#[derive(Clone)]
pub struct FilterSpec {
    operators: Vec<FilterOperator>,
    block: Option<FilterBlock>,
}

impl FilterSpec {
    /// Allowed operators; the first one is the default.
    pub fn operators(&self) -> &[FilterOperator] {
        &self.operators
    }

    /// Operator used when the client names none.
    pub fn default_operator(&self) -> Option<FilterOperator> {
        self.operators.first().copied()
    }

    pub(crate) fn block(&self) -> Option<&FilterBlock> {
        self.block.as_ref()
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("operators", &self.operators)
            .field("block", &self.block.is_some())
            .finish()
    }
}

/// A named, callable operation.
#[derive(Clone, Default)]
pub struct Action {
    name: String,
    title: Option<String>,
    description: Option<String>,
    params: Vec<ParamSpec>,
    errors: BTreeMap<String, ErrorSpec>,
    returns: Option<ReturnSpec>,
    authenticator: Option<String>,
    access_rule: Option<String>,
    bodies: Vec<BodyFn>,
    filters: BTreeMap<String, FilterSpec>,
    traits: BTreeSet<String>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("params", &self.params.iter().map(ParamSpec::name).collect::<Vec<_>>())
            .field("errors", &self.errors.keys().collect::<Vec<_>>())
            .field("returns", &self.returns)
            .field("authenticator", &self.authenticator)
            .field("access_rule", &self.access_rule)
            .field("bodies", &self.bodies.len())
            .field("filters", &self.filters)
            .finish()
    }
}

impl Action {
    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short title.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Documentation text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Parameter specs in declaration order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Declared error catalog.
    pub fn errors(&self) -> &BTreeMap<String, ErrorSpec> {
        &self.errors
    }

    /// Return spec, if declared.
    pub fn returns(&self) -> Option<&ReturnSpec> {
        self.returns.as_ref()
    }

    /// Authenticator named on the action itself.
    pub fn authenticator_override(&self) -> Option<&str> {
        self.authenticator.as_deref()
    }

    /// Access rule named on the action itself.
    pub fn access_rule_override(&self) -> Option<&str> {
        self.access_rule.as_deref()
    }

    /// Declared filterable attributes.
    pub fn filters(&self) -> &BTreeMap<String, FilterSpec> {
        &self.filters
    }

    /// Trait tags.
    pub fn traits(&self) -> &BTreeSet<String> {
        &self.traits
    }

    /// True if the action carries `name` as a trait.
    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains(name)
    }

    /// Defaults declared by the parameter specs.
    pub fn default_params(&self) -> serde_json::Map<String, Value> {
        self.params
            .iter()
            .filter_map(|spec| spec.default.clone().map(|d| (spec.name.clone(), d)))
            .collect()
    }

    pub(crate) fn bodies(&self) -> &[BodyFn] {
        &self.bodies
    }
}

#[derive(Clone, Default)]
pub(crate) struct FragmentScope {
    pub(crate) local: HashMap<String, Fragment>,
    pub(crate) global: HashMap<String, Fragment>,
}

/// Declaration API for one action.
pub struct ActionBuilder {
    action: Action,
    scope: FragmentScope,
    errors: Vec<ConfigError>,
}

impl ActionBuilder {
    pub(crate) fn new(name: impl Into<String>, scope: FragmentScope) -> Self {
        Self { action: Action { name: name.into(), ..Action::default() }, scope, errors: Vec::new() }
    }

    pub(crate) fn finish(self) -> (Action, Vec<ConfigError>) {
        (self.action, self.errors)
    }

    /// Short title.
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.action.title = Some(title.into());
        self
    }

    /// Documentation text.
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.action.description = Some(text.into());
        self
    }

    /// Declare a parameter. Redeclaring a name replaces the spec in place.
    pub fn param(&mut self, spec: ParamSpec) -> &mut Self {
        match self.action.params.iter_mut().find(|p| p.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.action.params.push(spec),
        }
        self
    }

    /// Declare an error code.
    pub fn error(&mut self, code: impl Into<String>, spec: ErrorSpec) -> &mut Self {
        self.action.errors.insert(code.into(), spec);
        self
    }

    /// Declare the return value.
    pub fn returns(&mut self, spec: ReturnSpec) -> &mut Self {
        self.action.returns = Some(spec);
        self
    }

    /// Use a specific authenticator instead of the controller's or the default.
    pub fn authenticator(&mut self, name: impl Into<String>) -> &mut Self {
        self.action.authenticator = Some(name.into());
        self
    }

    /// Use a specific access rule instead of the controller's or `"default"`.
    pub fn access_rule(&mut self, name: impl Into<String>) -> &mut Self {
        self.action.access_rule = Some(name.into());
        self
    }

    /// Tag the action with a trait.
    pub fn with_trait(&mut self, name: impl Into<String>) -> &mut Self {
        self.action.traits.insert(name.into());
        self
    }

    /// Append a body; bodies run in order, each receiving the previous result.
    pub fn body<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut Environment, Value) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.action.bodies.push(Arc::new(f));
        self
    }

    /// Declare a filterable attribute handled by the collection's default operator mapping.
    pub fn filterable<I>(&mut self, attribute: impl Into<String>, operators: I) -> &mut Self
    where
        I: IntoIterator<Item = FilterOperator>,
    {
        self.action.filters.insert(
            attribute.into(),
            FilterSpec { operators: operators.into_iter().collect(), block: None },
        );
        self
    }

    /// Declare a filterable attribute narrowed by a custom block over collections of type `C`.
    pub fn filterable_with<C, I, F>(
        &mut self,
        attribute: impl Into<String>,
        operators: I,
        f: F,
    ) -> &mut Self
    where
        C: Send + 'static,
        I: IntoIterator<Item = FilterOperator>,
        F: Fn(FilterOperator, &Value, C) -> Result<C, ActionError> + Send + Sync + 'static,
    {
        let attribute = attribute.into();
        let name = attribute.clone();
        let block: FilterBlock = Arc::new(
            move |operator: FilterOperator,
                  value: &Value,
                  collection: Box<dyn Any + Send>|
                  -> Result<Box<dyn Any + Send>, ActionError> {
                let typed = collection
                    .downcast::<C>()
                    .map_err(|_| ConfigError::FilterCollectionMismatch { attribute: name.clone() })?;
                let narrowed = f(operator, value, *typed)?;
                Ok(Box::new(narrowed))
            },
        );
        self.action.filters.insert(
            attribute,
            FilterSpec { operators: operators.into_iter().collect(), block: Some(block) },
        );
        self
    }

    /// Apply a shared fragment: controller-local first, then registry-global.
    ///
    /// An unknown name is reported when the controller definition is committed.
    pub fn share(&mut self, name: &str) -> &mut Self {
        let fragment =
            self.scope.local.get(name).or_else(|| self.scope.global.get(name)).cloned();
        match fragment {
            Some(fragment) => fragment(self),
            None => self.errors.push(ConfigError::InvalidSharedReference { name: name.to_string() }),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(raw: Value) -> ParamSet {
        ParamSet::from_value(raw)
    }

    #[test]
    fn static_options_apply_without_paramable() {
        let spec = ReturnSpec::object("user").options(ProjectOptions::full());
        let resolved = spec.resolve_options(
            &params(json!({"_full": false, "_expansions": true})),
            &LanyardConfig::default(),
        );
        assert!(resolved.full);
        assert_eq!(resolved.expansions, ExpansionSelection::None);
    }

    #[test]
    fn client_overrides_respect_allow_list() {
        let spec = ReturnSpec::object("user")
            .paramable(Paramable::none().allow_full().allow_expansions_only(["animals"]));
        let resolved = spec.resolve_options(
            &params(json!({"_full": "1", "_expansions": ["animals", "other"]})),
            &LanyardConfig::default(),
        );
        assert!(resolved.full);
        assert_eq!(resolved.expansions, ExpansionSelection::names(["animals"]));

        let all = spec.resolve_options(&params(json!({"_expansions": true})), &LanyardConfig::default());
        assert_eq!(all.expansions, ExpansionSelection::names(["animals"]));
    }

    #[test]
    fn paramable_predicates() {
        assert!(!Paramable::none().can_change_full());
        assert!(!Paramable::none().can_change_expansions());
        assert!(Paramable::all().can_change_full());
        assert!(Paramable::none().allow_expansions_only(["a"]).can_change_expansions());
    }

    #[test]
    fn shared_fragments_resolve_local_then_global() {
        let mut scope = FragmentScope::default();
        let global: Fragment = Arc::new(|a: &mut ActionBuilder| {
            a.param(ParamSpec::new("page").default(1));
        });
        let local: Fragment = Arc::new(|a: &mut ActionBuilder| {
            a.param(ParamSpec::new("page").default(2));
        });
        scope.global.insert("paging".into(), global);
        let mut builder = ActionBuilder::new("list", scope.clone());
        builder.share("paging");
        let (action, errors) = builder.finish();
        assert!(errors.is_empty());
        assert_eq!(action.default_params()["page"], json!(1));

        scope.local.insert("paging".into(), local);
        let mut builder = ActionBuilder::new("list", scope);
        builder.share("paging").share("missing");
        let (action, errors) = builder.finish();
        assert_eq!(action.default_params()["page"], json!(2));
        assert_eq!(errors, vec![ConfigError::InvalidSharedReference { name: "missing".into() }]);
    }

    #[test]
    fn filter_block_rejects_foreign_collections() {
        let mut builder = ActionBuilder::new("list", FragmentScope::default());
        builder.filterable_with::<Vec<u32>, _, _>("n", [FilterOperator::Eq], |_, _, c| Ok(c));
        let (action, _) = builder.finish();
        let block = action.filters()["n"].block().cloned().expect("block declared");
        let ok = block(FilterOperator::Eq, &json!(1), Box::new(vec![1u32]));
        assert!(ok.is_ok());
        let err = block(FilterOperator::Eq, &json!(1), Box::new("nope".to_string()));
        assert!(matches!(err, Err(ActionError::Config(ConfigError::FilterCollectionMismatch { .. }))));
    }
}
