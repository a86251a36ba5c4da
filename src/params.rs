//! Request parameters: the defaulting [`ParamSet`] view and per-action [`ParamSpec`] validation.
//!
//! Semantics:
//! - Empty strings and `null` count as absent, so defaults apply to them.
//! - Any other explicit value wins over a default, including `false`, `0` and `[]`.
//! - Validation walks specs in declaration order and fails on the first violation.
//!   For a single parameter the checks run required, regex, options, type; so a missing
//!   required value is always reported as missing, never as badly typed.

use crate::error::{ParameterErrorCode, RequestError};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Typed, default-aware view over raw request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    values: Map<String, Value>,
    defaults: Map<String, Value>,
}

impl ParamSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. Anything other than an object yields an empty set.
    pub fn from_value(raw: Value) -> Self {
        match raw {
            Value::Object(values) => Self { values, defaults: Map::new() },
            _ => Self::default(),
        }
    }

    /// Explicit value if present and non-blank, else the default, else `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .filter(|v| !is_blank(v))
            .or_else(|| self.defaults.get(name).filter(|v| !is_blank(v)))
    }

    /// True if an explicit non-blank value or a default exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Merge defaults; consulted only when the explicit value is absent.
    pub fn set_defaults(&mut self, defaults: Map<String, Value>) {
        self.defaults.extend(defaults);
    }

    /// Add a single default.
    pub fn set_default(&mut self, name: impl Into<String>, value: Value) {
        self.defaults.insert(name.into(), value);
    }

    /// String value, if the parameter is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer value; numeric strings are accepted.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value using the recognized literal set (see [`coerce_bool`]).
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(coerce_bool)
    }

    /// Names of explicitly supplied, non-blank parameters.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter(|(_, v)| !is_blank(v)).map(|(k, _)| k.as_str())
    }

    /// Replace the effective value where it lives: the explicit value when one was
    /// supplied, else the default. Used for in-place coercion during validation.
    pub(crate) fn set(&mut self, name: &str, value: Value) {
        match self.values.get_mut(name).filter(|v| !is_blank(v)) {
            Some(slot) => *slot = value,
            None => {
                self.defaults.insert(name.to_string(), value);
            }
        }
    }

    /// Effective values (explicit over default) as a JSON object.
    pub fn to_value(&self) -> Value {
        let mut merged = self.defaults.clone();
        merged.retain(|_, v| !is_blank(v));
        for (k, v) in &self.values {
            if !is_blank(v) {
                merged.insert(k.clone(), v.clone());
            }
        }
        Value::Object(merged)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Canonical boolean for the recognized literal set: native booleans, `1`/`0`, and the
/// strings `"true"`, `"false"`, `"1"`, `"0"`.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Declared type of a parameter or attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// Whole number.
    Integer,
    /// Any number.
    Float,
    /// Boolean; coerced from the recognized literal set.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
    /// Symbolic tag (e.g. `"timestamp"`); documented but never checked.
    Tag(String),
}

impl ValueType {
    /// Concrete types are checked at validation time; tags are not.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Tag(_))
    }

    /// Runtime type check. Tags match everything.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Tag(_) => true,
        }
    }

    /// Documentation name.
    pub fn name(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Tag(tag) => tag.as_str(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type ApplyFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Declaration of one action parameter.
#[derive(Clone)]
pub struct ParamSpec {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) required: bool,
    pub(crate) default: Option<Value>,
    pub(crate) value_type: Option<ValueType>,
    pub(crate) regex: Option<Regex>,
    pub(crate) options: Option<Vec<Value>>,
    pub(crate) apply: Option<ApplyFn>,
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("value_type", &self.value_type)
            .field("regex", &self.regex.as_ref().map(Regex::as_str))
            .field("options", &self.options)
            .field("apply", &self.apply.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl ParamSpec {
    /// Optional, untyped parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            default: None,
            value_type: None,
            regex: None,
            options: None,
            apply: None,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation text.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Reject requests where the parameter is absent.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the caller omits the parameter.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Declared type.
    pub fn of_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Stringified value must match this pattern.
    pub fn regex(mut self, pattern: Regex) -> Self {
        self.regex = Some(pattern);
        self
    }

    /// Value must be one of these.
    pub fn options<I, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    /// Transform the value after it validates.
    pub fn apply<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.apply = Some(Arc::new(f));
        self
    }

    /// Check one parameter, coercing booleans and applying the transform in place.
    pub fn validate(&self, params: &mut ParamSet) -> Result<(), RequestError> {
        let value = match params.get(&self.name) {
            Some(value) => value.clone(),
            None if self.required => {
                return Err(RequestError::parameter(
                    ParameterErrorCode::MissingRequiredParameter,
                    format!("`{}` parameter is required but is missing", self.name),
                ))
            }
            None => return Ok(()),
        };

        if let Some(regex) = &self.regex {
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !regex.is_match(&text) {
                return Err(RequestError::parameter(
                    ParameterErrorCode::InvalidFormat,
                    format!("`{}` parameter is invalid (must match {})", self.name, regex.as_str()),
                ));
            }
        }

        if let Some(options) = &self.options {
            if !options.contains(&value) {
                let allowed: Vec<String> = options.iter().map(Value::to_string).collect();
                return Err(RequestError::parameter(
                    ParameterErrorCode::InvalidOption,
                    format!("`{}` parameter must be one of {}", self.name, allowed.join(", ")),
                ));
            }
        }

        let mut value = value;
        match &self.value_type {
            Some(ValueType::Boolean) => match coerce_bool(&value) {
                Some(b) => {
                    value = Value::Bool(b);
                    params.set(&self.name, value.clone());
                }
                None => {
                    return Err(RequestError::parameter(
                        ParameterErrorCode::InvalidType,
                        format!("`{}` parameter should be a boolean value", self.name),
                    ))
                }
            },
            Some(value_type) if value_type.is_concrete() && !value_type.matches(&value) => {
                return Err(RequestError::parameter(
                    ParameterErrorCode::InvalidType,
                    format!("`{}` parameter should be a {}", self.name, value_type),
                ))
            }
            _ => {}
        }

        if let Some(apply) = &self.apply {
            params.set(&self.name, apply(value));
        }
        Ok(())
    }
}

/// Inject declared defaults, then validate every spec in declaration order.
pub fn validate_params(specs: &[ParamSpec], params: &mut ParamSet) -> Result<(), RequestError> {
    let defaults: Map<String, Value> = specs
        .iter()
        .filter_map(|spec| spec.default.clone().map(|d| (spec.name.clone(), d)))
        .collect();
    params.set_defaults(defaults);
    for spec in specs {
        spec.validate(params)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(raw: Value) -> ParamSet {
        ParamSet::from_value(raw)
    }

    #[test]
    fn explicit_value_wins_over_default() {
        let mut p = params(json!({"page": 3, "active": false, "name": ""}));
        p.set_default("page", json!(1));
        p.set_default("active", json!(true));
        p.set_default("name", json!("anon"));
        assert_eq!(p.get("page"), Some(&json!(3)));
        assert_eq!(p.get("active"), Some(&json!(false)));
        assert_eq!(p.get("name"), Some(&json!("anon")), "empty string falls back to default");
    }

    #[test]
    fn has_requires_value_or_default() {
        let mut p = params(json!({"a": "", "b": "x"}));
        assert!(!p.has("a"));
        assert!(p.has("b"));
        assert!(!p.has("c"));
        p.set_default("c", json!(0));
        assert!(p.has("c"));
    }

    #[test]
    fn non_object_input_is_empty() {
        let p = params(json!([1, 2]));
        assert_eq!(p.keys().count(), 0);
    }

    #[test]
    fn required_wins_over_type_check() {
        let spec = ParamSpec::new("username").required().of_type(ValueType::String);
        let mut p = params(json!({"username": ""}));
        let err = spec.validate(&mut p).unwrap_err();
        assert!(matches!(
            err,
            RequestError::Parameter { code: ParameterErrorCode::MissingRequiredParameter, .. }
        ));
    }

    #[test]
    fn boolean_literals_are_coerced_in_place() {
        let spec = ParamSpec::new("flag").of_type(ValueType::Boolean);
        for (raw, expected) in [
            (json!("true"), true),
            (json!("0"), false),
            (json!(1), true),
            (json!(false), false),
        ] {
            let mut p = params(json!({ "flag": raw }));
            spec.validate(&mut p).expect("recognized literal");
            assert_eq!(p.get("flag"), Some(&json!(expected)));
        }
        let mut p = params(json!({"flag": "yes"}));
        assert!(spec.validate(&mut p).is_err());
    }

    #[test]
    fn regex_options_and_type_checks() {
        let spec = ParamSpec::new("code").regex(Regex::new(r"^[A-Z]{3}$").unwrap());
        let mut ok = params(json!({"code": "ABC"}));
        assert!(spec.validate(&mut ok).is_ok());
        let mut bad = params(json!({"code": "abcd"}));
        assert!(matches!(
            spec.validate(&mut bad),
            Err(RequestError::Parameter { code: ParameterErrorCode::InvalidFormat, .. })
        ));

        let spec = ParamSpec::new("sort").options(["asc", "desc"]);
        let mut bad = params(json!({"sort": "up"}));
        assert!(matches!(
            spec.validate(&mut bad),
            Err(RequestError::Parameter { code: ParameterErrorCode::InvalidOption, .. })
        ));

        let spec = ParamSpec::new("count").of_type(ValueType::Integer);
        let mut bad = params(json!({"count": "12"}));
        assert!(matches!(
            spec.validate(&mut bad),
            Err(RequestError::Parameter { code: ParameterErrorCode::InvalidType, .. })
        ));

        let spec = ParamSpec::new("at").of_type(ValueType::Tag("timestamp".into()));
        let mut any = params(json!({"at": [1, 2]}));
        assert!(spec.validate(&mut any).is_ok());
    }

    #[test]
    fn defaults_are_injected_and_apply_runs() {
        let specs = vec![
            ParamSpec::new("page").of_type(ValueType::Integer).default(1),
            ParamSpec::new("name").apply(|v| json!(v.as_str().unwrap_or_default().to_uppercase())),
        ];
        let mut p = params(json!({"name": "ada"}));
        validate_params(&specs, &mut p).expect("valid");
        assert_eq!(p.get("page"), Some(&json!(1)));
        assert_eq!(p.get("name"), Some(&json!("ADA")));
    }

    #[test]
    fn coerced_defaults_stay_defaults() {
        let specs = vec![ParamSpec::new("verbose").of_type(ValueType::Boolean).default("true")];
        let mut p = params(json!({}));
        validate_params(&specs, &mut p).expect("valid");
        assert_eq!(p.get("verbose"), Some(&json!(true)));
        assert_eq!(p.keys().count(), 0);

        let mut p = params(json!({"verbose": "0"}));
        validate_params(&specs, &mut p).expect("valid");
        assert_eq!(p.get("verbose"), Some(&json!(false)));
        assert_eq!(p.keys().collect::<Vec<_>>(), vec!["verbose"]);
    }
}
