//! Projection engine: entity + subject + options → JSON object.
//!
//! Order of evaluation:
//! 1. basic-tier attributes, then the basic block deep-merged on top;
//! 2. if `full`, full-tier attributes, then the full block deep-merged on top;
//! 3. the attribute whitelist, applied to top-level keys;
//! 4. selected expansions (expansion-tier attributes, then named blocks).
//!
//! Invariants:
//! - An attribute whose conditions do not all pass is skipped entirely.
//! - Attributes are placed at `group_path + [name]`; later writes win.
//! - Projection is pure with respect to the definitions: the same inputs give the same output.

use crate::entity::{conditions_pass, Attribute, Entity, Source, Tier, ValueFn};
use crate::environment::Environment;
use crate::error::{ActionError, ConfigError};
use crate::params::coerce_bool;
use crate::subject::{Field, SubjectRef};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{trace, warn};

/// One expansion picked by name, optionally with options for its nested projection.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpansion {
    /// Expansion name.
    pub name: String,
    /// Options for the nested entity projection.
    pub options: Option<ProjectOptions>,
}

impl NamedExpansion {
    /// Select by name with default nested options.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), options: None }
    }

    /// Select by name with explicit nested options.
    pub fn with_options(name: impl Into<String>, options: ProjectOptions) -> Self {
        Self { name: name.into(), options: Some(options) }
    }
}

/// Which expansions to include.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExpansionSelection {
    /// No expansions.
    #[default]
    None,
    /// Every expansion whose conditions pass.
    All,
    /// Only the listed names, matched exactly.
    Named(Vec<NamedExpansion>),
}

impl ExpansionSelection {
    /// Select a list of names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(NamedExpansion::new).collect())
    }

    /// True unless nothing is selected.
    pub fn any(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// `Some(options)` if `name` is selected; the inner value carries nested options.
    pub fn lookup(&self, name: &str) -> Option<Option<&ProjectOptions>> {
        match self {
            Self::None => None,
            Self::All => Some(None),
            Self::Named(list) => list.iter().find(|e| e.name == name).map(|e| e.options.as_ref()),
        }
    }

    /// Interpret a client-supplied value: a boolean literal or a list of names.
    ///
    /// Returns `None` for values that are neither.
    pub fn from_client(value: &Value) -> Option<Self> {
        if let Some(flag) = coerce_bool(value) {
            return Some(if flag { Self::All } else { Self::None });
        }
        match value {
            Value::Array(items) => Some(Self::names(items.iter().filter_map(Value::as_str))),
            Value::String(list) => Some(Self::names(
                list.split(',').map(str::trim).filter(|s| !s.is_empty()),
            )),
            _ => None,
        }
    }

    /// Keep only names present in `allowed`, preserving request order.
    pub fn restrict_to(self, allowed: &[String]) -> Self {
        match self {
            Self::None => Self::None,
            Self::All => Self::names(allowed.iter().cloned()),
            Self::Named(list) => {
                Self::Named(list.into_iter().filter(|e| allowed.contains(&e.name)).collect())
            }
        }
    }
}

impl From<bool> for ExpansionSelection {
    fn from(flag: bool) -> Self {
        if flag {
            Self::All
        } else {
            Self::None
        }
    }
}

/// Options controlling a single projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectOptions {
    /// Include full-tier attributes and the full block.
    pub full: bool,
    /// Expansions to include.
    pub expansions: ExpansionSelection,
    /// Keep only these top-level keys (applied before expansions).
    pub attributes: Option<Vec<String>>,
}

impl ProjectOptions {
    /// Basic detail, no expansions.
    pub fn basic() -> Self {
        Self::default()
    }

    /// Full detail, no expansions.
    pub fn full() -> Self {
        Self { full: true, ..Self::default() }
    }

    /// Set the full-detail flag.
    pub fn with_full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Set the expansion selection.
    pub fn with_expansions(mut self, expansions: impl Into<ExpansionSelection>) -> Self {
        self.expansions = expansions.into();
        self
    }

    /// Restrict output to these top-level keys.
    pub fn only<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }
}

/// Project `subject` through `entity`.
///
/// `env` supplies the caller's identity and request; a scoped copy bound to `subject` is
/// what attribute blocks and conditions see.
pub fn project(
    env: &Environment,
    entity: &Entity,
    subject: SubjectRef,
    options: &ProjectOptions,
) -> Result<Value, ActionError> {
    trace!(target: "lanyard::projection", entity = entity.name(), full = options.full, "project");
    let scope = env.scoped(subject);
    let mut out = Map::new();

    project_tier(&scope, entity, Tier::Basic, &mut out)?;
    if let Some(block) = entity.basic_block() {
        merge_block(&scope, entity, block, &mut out)?;
    }

    if options.full {
        project_tier(&scope, entity, Tier::Full, &mut out)?;
        if let Some(block) = entity.full_block() {
            merge_block(&scope, entity, block, &mut out)?;
        }
    }

    if let Some(whitelist) = &options.attributes {
        out.retain(|key, _| whitelist.iter().any(|w| w == key));
    }

    if options.expansions.any() {
        for attribute in entity.attributes(Tier::Expansion) {
            let Some(nested) = options.expansions.lookup(&attribute.name) else {
                continue;
            };
            if let Some(value) = evaluate_attribute(&scope, attribute, nested)? {
                place(&mut out, &attribute.group_path, &attribute.name, value);
            }
        }
        for expansion in entity.expansions() {
            if options.expansions.lookup(&expansion.name).is_none() {
                continue;
            }
            if !conditions_pass(&expansion.conditions, &scope)? {
                continue;
            }
            let value = (expansion.block)(&scope)?;
            out.insert(expansion.name.clone(), value);
        }
    }

    Ok(Value::Object(out))
}

fn project_tier(
    scope: &Environment,
    entity: &Entity,
    tier: Tier,
    out: &mut Map<String, Value>,
) -> Result<(), ActionError> {
    for attribute in entity.attributes(tier) {
        if let Some(value) = evaluate_attribute(scope, attribute, None)? {
            place(out, &attribute.group_path, &attribute.name, value);
        }
    }
    Ok(())
}

fn merge_block(
    scope: &Environment,
    entity: &Entity,
    block: &ValueFn,
    out: &mut Map<String, Value>,
) -> Result<(), ActionError> {
    match block(scope)? {
        Value::Object(computed) => deep_merge(out, computed),
        Value::Null => {}
        other => warn!(
            target: "lanyard::projection",
            entity = entity.name(),
            kind = value_kind(&other),
            "entity block returned a non-object; ignored"
        ),
    }
    Ok(())
}

/// Evaluate one attribute; `None` when a condition fails.
fn evaluate_attribute(
    scope: &Environment,
    attribute: &Attribute,
    nested: Option<&ProjectOptions>,
) -> Result<Option<Value>, ActionError> {
    if !conditions_pass(&attribute.conditions, scope)? {
        return Ok(None);
    }
    let raw = match &attribute.source {
        Source::Literal(value) => Field::Value(value.clone()),
        Source::Computed(block) => Field::Value(block(scope)?),
        Source::Field(name) => scope
            .subject()
            .and_then(|s| s.field(name))
            .unwrap_or(Field::Value(Value::Null)),
    };
    let value = match &attribute.entity {
        Some(reference) => {
            let options = nested.or(reference.options.as_ref()).cloned().unwrap_or_default();
            project_field(scope, &reference.name, raw, &options)?
        }
        None => raw.into_value(),
    };
    Ok(Some(match &attribute.mutation {
        Some(mutate) => mutate(value),
        None => value,
    }))
}

/// Project a raw field through a named entity, mapping over sequences.
fn project_field(
    scope: &Environment,
    entity_name: &str,
    field: Field,
    options: &ProjectOptions,
) -> Result<Value, ActionError> {
    let entity = scope
        .registry()
        .entity(entity_name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownEntity { name: entity_name.to_string() })?;
    match field {
        Field::Subject(subject) => project(scope, &entity, subject, options),
        Field::Subjects(list) => list
            .into_iter()
            .map(|s| project(scope, &entity, s, options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Field::Value(Value::Array(items)) => items
            .into_iter()
            .map(|item| project_value(scope, &entity, item, options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Field::Value(value) => project_value(scope, &entity, value, options),
    }
}

fn project_value(
    scope: &Environment,
    entity: &Entity,
    value: Value,
    options: &ProjectOptions,
) -> Result<Value, ActionError> {
    match value {
        Value::Object(_) => project(scope, entity, Arc::new(value), options),
        other => Ok(other),
    }
}

/// Insert `value` at `path + [name]`, creating intermediate objects as needed.
pub(crate) fn place(out: &mut Map<String, Value>, path: &[String], name: &str, value: Value) {
    let mut cursor = out;
    for group in path {
        let slot = cursor.entry(group.clone()).or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        cursor = match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot normalized to an object above"),
        };
    }
    cursor.insert(name.to_string(), value);
}

/// Recursive merge: nested objects merge key by key, anything else overwrites.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        let both_objects =
            matches!((target.get(&key), &incoming), (Some(Value::Object(_)), Value::Object(_)));
        if both_objects {
            if let (Some(Value::Object(existing)), Value::Object(nested)) =
                (target.get_mut(&key), incoming)
            {
                deep_merge(existing, nested);
            }
        } else {
            target.insert(key, incoming);
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
