//! Entity definitions: the declared shape of a projection.
//!
//! An [`Entity`] is an ordered list of [`Attribute`]s split into three tiers, two optional
//! bulk blocks (`basic`, `full`) and a set of named expansions. Entities are immutable once
//! the registry is loaded; re-declaring an entity by name adds to the existing definition.

use crate::environment::Environment;
use crate::error::{ActionError, ConfigError};
use crate::params::ValueType;
use crate::projection::ProjectOptions;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Computed value evaluated against an environment.
pub type ValueFn = Arc<dyn Fn(&Environment) -> Result<Value, ActionError> + Send + Sync>;
/// Post-processing applied to an attribute's raw value.
pub type MutateFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Inline condition predicate.
pub type PredicateFn = Arc<dyn Fn(&Environment) -> bool + Send + Sync>;

/// Disclosure tier of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Always included.
    Basic,
    /// Included when full detail is requested.
    Full,
    /// Included only when selected as an expansion.
    Expansion,
}

/// Gate on an attribute, expansion or scoped group of declarations.
#[derive(Clone)]
pub enum Condition {
    /// Delegate to a named access rule of a named authenticator.
    Rule {
        /// Authenticator name.
        authenticator: String,
        /// Rule name.
        rule: String,
    },
    /// Inline predicate over the environment.
    Predicate(PredicateFn),
}

impl Condition {
    /// Gate on an authenticator's access rule.
    pub fn rule(authenticator: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::Rule { authenticator: authenticator.into(), rule: rule.into() }
    }

    /// Gate on an inline predicate.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&Environment) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Evaluate for the environment's identity and subject.
    pub fn evaluate(&self, env: &Environment) -> Result<bool, ConfigError> {
        match self {
            Self::Predicate(predicate) => Ok(predicate(env)),
            Self::Rule { authenticator, rule } => {
                match env.registry().authenticator(authenticator) {
                    Some(auth) => auth.evaluate(rule, env),
                    None if rule == crate::authenticator::DEFAULT_RULE => Ok(true),
                    None => Err(ConfigError::MissingAuthenticator { name: authenticator.clone() }),
                }
            }
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule { authenticator, rule } => write!(f, "Rule({authenticator}.{rule})"),
            Self::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// True when every condition passes. Stops at the first failure.
pub fn conditions_pass(conditions: &[Condition], env: &Environment) -> Result<bool, ConfigError> {
    for condition in conditions {
        if !condition.evaluate(env)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Where an attribute's raw value comes from.
#[derive(Clone)]
pub enum Source {
    /// Read a named field from the subject.
    Field(String),
    /// Compute from the environment.
    Computed(ValueFn),
    /// Fixed value.
    Literal(Value),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "Field({name})"),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
            Self::Literal(v) => write!(f, "Literal({v})"),
        }
    }
}

/// Reference to another entity used to project a nested value.
#[derive(Debug, Clone)]
pub struct EntityRef {
    /// Target entity name.
    pub name: String,
    /// Options for the nested projection; basic detail when `None`.
    pub options: Option<ProjectOptions>,
}

/// One declared field of an entity.
#[derive(Clone)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) tier: Tier,
    pub(crate) description: Option<String>,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) example: Option<Value>,
    pub(crate) source: Source,
    pub(crate) entity: Option<EntityRef>,
    pub(crate) group_path: Vec<String>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) mutation: Option<MutateFn>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("source", &self.source)
            .field("entity", &self.entity)
            .field("group_path", &self.group_path)
            .field("conditions", &self.conditions)
            .field("mutation", &self.mutation.is_some())
            .finish()
    }
}

impl Attribute {
    fn with_source(name: String, source: Source) -> Self {
        Self {
            name,
            tier: Tier::Basic,
            description: None,
            value_type: None,
            example: None,
            source,
            entity: None,
            group_path: Vec::new(),
            conditions: Vec::new(),
            mutation: None,
        }
    }

    /// Attribute read from the subject field of the same name.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_source(name.clone(), Source::Field(name))
    }

    /// Attribute computed from the environment.
    pub fn computed<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Environment) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        Self::with_source(name.into(), Source::Computed(Arc::new(f)))
    }

    /// Attribute with a fixed value.
    pub fn literal(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_source(name.into(), Source::Literal(value.into()))
    }

    /// Read from a differently named subject field.
    pub fn from_field(mut self, field: impl Into<String>) -> Self {
        self.source = Source::Field(field.into());
        self
    }

    /// Project the raw value through another entity (basic detail).
    pub fn entity(mut self, name: impl Into<String>) -> Self {
        self.entity = Some(EntityRef { name: name.into(), options: None });
        self
    }

    /// Project the raw value through another entity with explicit options.
    pub fn entity_with(mut self, name: impl Into<String>, options: ProjectOptions) -> Self {
        self.entity = Some(EntityRef { name: name.into(), options: Some(options) });
        self
    }

    /// Transform the raw value before it is placed.
    pub fn mutate<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.mutation = Some(Arc::new(f));
        self
    }

    /// Add a condition local to this attribute.
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Documentation text.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Declared type, for documentation.
    pub fn of_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Example value, for documentation.
    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    /// Attribute name (the output key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Disclosure tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Enclosing groups, outermost first.
    pub fn group_path(&self) -> &[String] {
        &self.group_path
    }

    /// Referenced entity, if any.
    pub fn entity_ref(&self) -> Option<&EntityRef> {
        self.entity.as_ref()
    }

    /// Every condition gating this attribute, scoped ones first.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Documentation text.
    pub fn doc(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared type.
    pub fn value_type(&self) -> Option<&ValueType> {
        self.value_type.as_ref()
    }
}

/// A named, independently gated block producing an expansion value.
#[derive(Clone)]
pub struct Expansion {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) block: ValueFn,
}

impl Expansion {
    /// Expansion name (the output key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Conditions gating this expansion.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl fmt::Debug for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expansion")
            .field("name", &self.name)
            .field("conditions", &self.conditions)
            .finish()
    }
}

/// Declared projection shape.
#[derive(Clone, Default)]
pub struct Entity {
    name: String,
    description: Option<String>,
    basic: Vec<Attribute>,
    full: Vec<Attribute>,
    expansion: Vec<Attribute>,
    basic_block: Option<ValueFn>,
    full_block: Option<ValueFn>,
    expansions: Vec<Expansion>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("basic", &self.basic.iter().map(|a| a.name.as_str()).collect::<Vec<_>>())
            .field("full", &self.full.iter().map(|a| a.name.as_str()).collect::<Vec<_>>())
            .field("expansion", &self.expansion.iter().map(|a| a.name.as_str()).collect::<Vec<_>>())
            .field("expansions", &self.expansions.iter().map(|e| e.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl Entity {
    /// Empty entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Attributes of one tier, in declaration order.
    pub fn attributes(&self, tier: Tier) -> &[Attribute] {
        match tier {
            Tier::Basic => &self.basic,
            Tier::Full => &self.full,
            Tier::Expansion => &self.expansion,
        }
    }

    /// Bulk block merged after the basic attributes.
    pub fn basic_block(&self) -> Option<&ValueFn> {
        self.basic_block.as_ref()
    }

    /// Bulk block merged after the full attributes.
    pub fn full_block(&self) -> Option<&ValueFn> {
        self.full_block.as_ref()
    }

    /// Named block expansions, in declaration order.
    pub fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    /// Every name selectable as an expansion: expansion-tier attributes, then named blocks.
    pub fn expansion_names(&self) -> Vec<&str> {
        self.expansion
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.expansions.iter().map(|e| e.name.as_str()))
            .collect()
    }

    /// Every attribute and expansion, for wiring checks.
    pub(crate) fn all_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.basic.iter().chain(self.full.iter()).chain(self.expansion.iter())
    }
}

/// Declaration API handed to `Registry::define_entity`.
///
/// `group` and `condition` open scopes: every attribute declared inside inherits the group
/// path and conditions of all enclosing scopes.
pub struct EntityBuilder<'a> {
    entity: &'a mut Entity,
    groups: Vec<String>,
    conditions: Vec<Condition>,
}

impl<'a> EntityBuilder<'a> {
    pub(crate) fn new(entity: &'a mut Entity) -> Self {
        Self { entity, groups: Vec::new(), conditions: Vec::new() }
    }

    /// Documentation text.
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.entity.description = Some(text.into());
        self
    }

    fn push(&mut self, tier: Tier, mut attribute: Attribute) -> &mut Self {
        attribute.tier = tier;
        let mut path = self.groups.clone();
        path.append(&mut attribute.group_path);
        attribute.group_path = path;
        let mut conditions = self.conditions.clone();
        conditions.append(&mut attribute.conditions);
        attribute.conditions = conditions;
        match tier {
            Tier::Basic => self.entity.basic.push(attribute),
            Tier::Full => self.entity.full.push(attribute),
            Tier::Expansion => self.entity.expansion.push(attribute),
        }
        self
    }

    /// Declare a basic-tier attribute.
    pub fn basic(&mut self, attribute: Attribute) -> &mut Self {
        self.push(Tier::Basic, attribute)
    }

    /// Declare a full-tier attribute.
    pub fn full(&mut self, attribute: Attribute) -> &mut Self {
        self.push(Tier::Full, attribute)
    }

    /// Declare an expansion-tier attribute.
    pub fn expansion(&mut self, attribute: Attribute) -> &mut Self {
        self.push(Tier::Expansion, attribute)
    }

    /// Nest every attribute declared in `f` under `name`.
    pub fn group<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.groups.push(name.into());
        f(self);
        self.groups.pop();
        self
    }

    /// Gate every attribute and expansion declared in `f` on `condition`.
    pub fn condition<F>(&mut self, condition: Condition, f: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.conditions.push(condition);
        f(self);
        self.conditions.pop();
        self
    }

    /// Bulk block merged on top of the basic attributes.
    pub fn basic_block<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Environment) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.entity.basic_block = Some(Arc::new(f));
        self
    }

    /// Bulk block merged on top of the full attributes.
    pub fn full_block<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Environment) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.entity.full_block = Some(Arc::new(f));
        self
    }

    /// Named expansion computed by a block. Redeclaring a name replaces it.
    pub fn expand<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Environment) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.expand_described(name, None::<String>, f)
    }

    /// Named expansion with documentation text.
    pub fn expand_described<F>(
        &mut self,
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Environment) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        let expansion = Expansion {
            name: name.into(),
            description: description.map(Into::into),
            conditions: self.conditions.clone(),
            block: Arc::new(f),
        };
        self.entity.expansions.retain(|e| e.name != expansion.name);
        self.entity.expansions.push(expansion);
        self
    }
}
