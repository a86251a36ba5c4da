//! Error taxonomy.
//!
//! Two families with different fates:
//! - [`RequestError`] values are routine outcomes. The dispatch pipeline catches them and
//!   turns them into result envelopes.
//! - [`ConfigError`] values are wiring bugs. They always propagate out of `dispatch` so they
//!   surface during development instead of being reported to a client.
//!
//! [`ActionError`] is what caller-supplied logic returns; [`DispatchError`] is what escapes
//! the pipeline.

use serde_json::{json, Map, Value};
use std::error::Error as StdError;
use std::fmt;

/// Request-kind errors. Each maps to a status tag and a JSON object payload.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RequestError {
    /// The caller is not allowed to perform the action.
    #[error("access denied ({code}): {message}")]
    AccessDenied {
        /// Machine-readable reason, usually the access rule's error code.
        code: String,
        /// Human-readable description.
        message: String,
    },
    /// A requested resource does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What could not be found.
        message: String,
    },
    /// Domain validation failed; `errors` is a caller-shaped description of the failures.
    #[error("validation failed")]
    Validation {
        /// Validation failures, typically field name to list of messages.
        errors: Value,
    },
    /// A request parameter was missing or malformed.
    #[error("parameter error ({code}): {message}")]
    Parameter {
        /// Which check failed.
        code: ParameterErrorCode,
        /// Human-readable description naming the parameter.
        message: String,
    },
    /// A client-supplied filter was rejected.
    #[error("filter error ({code}): {message}")]
    Filter {
        /// Which filter check failed.
        code: FilterErrorCode,
        /// Human-readable description.
        message: String,
    },
    /// Catch-all error with a caller-supplied code and payload.
    #[error("request error ({code}): {message}")]
    Structured {
        /// Caller-supplied error code.
        code: String,
        /// Human-readable description.
        message: String,
        /// Extra payload fields merged into the envelope data.
        data: Map<String, Value>,
    },
}

impl RequestError {
    /// Access denied with an explicit code.
    pub fn access_denied(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AccessDenied { code: code.into(), message: message.into() }
    }

    /// Resource not found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Validation failure carrying an arbitrary error description.
    pub fn validation(errors: Value) -> Self {
        Self::Validation { errors }
    }

    /// Parameter failure.
    pub fn parameter(code: ParameterErrorCode, message: impl Into<String>) -> Self {
        Self::Parameter { code, message: message.into() }
    }

    /// Filter failure.
    pub fn filter(code: FilterErrorCode, message: impl Into<String>) -> Self {
        Self::Filter { code, message: message.into() }
    }

    /// Generic structured error with no extra data.
    pub fn structured(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structured { code: code.into(), message: message.into(), data: Map::new() }
    }

    /// Status tag used in the result envelope.
    pub fn status(&self) -> &'static str {
        match self {
            Self::AccessDenied { .. } => "access-denied",
            Self::NotFound { .. } => "not-found",
            Self::Validation { .. } => "validation-error",
            Self::Parameter { .. } => "parameter-error",
            Self::Filter { .. } => "filter-error",
            Self::Structured { .. } => "request-error",
        }
    }

    /// JSON object placed under `data` in the result envelope.
    pub fn payload(&self) -> Value {
        match self {
            Self::AccessDenied { code, message } => json!({ "code": code, "message": message }),
            Self::NotFound { message } => json!({ "message": message }),
            Self::Validation { errors } => json!({ "errors": errors }),
            Self::Parameter { code, message } => {
                json!({ "code": code.as_str(), "message": message })
            }
            Self::Filter { code, message } => json!({ "code": code.as_str(), "message": message }),
            Self::Structured { code, message, data } => {
                let mut payload = data.clone();
                payload.insert("code".into(), Value::String(code.clone()));
                payload.insert("message".into(), Value::String(message.clone()));
                Value::Object(payload)
            }
        }
    }
}

/// Which parameter check rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterErrorCode {
    /// A required parameter was absent.
    MissingRequiredParameter,
    /// The value did not match the declared regex.
    InvalidFormat,
    /// The value is not one of the declared options.
    InvalidOption,
    /// The value's runtime type does not match the declared type.
    InvalidType,
}

impl ParameterErrorCode {
    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredParameter => "MissingRequiredParameter",
            Self::InvalidFormat => "InvalidFormat",
            Self::InvalidOption => "InvalidOption",
            Self::InvalidType => "InvalidType",
        }
    }
}

impl fmt::Display for ParameterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which filter check rejected a client filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterErrorCode {
    /// The attribute is not declared filterable on the action.
    UnsupportedAttribute,
    /// The operator is unknown or not allowed for the attribute.
    InvalidOperator,
    /// `in`/`not_in` was used with a non-array value.
    ArrayNeeded,
    /// The `filters` parameter was not an object.
    MalformedFilters,
}

impl FilterErrorCode {
    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedAttribute => "UnsupportedAttribute",
            Self::InvalidOperator => "InvalidOperator",
            Self::ArrayNeeded => "ArrayNeeded",
            Self::MalformedFilters => "MalformedFilters",
        }
    }
}

impl fmt::Display for FilterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-kind errors: wiring bugs that must never become envelopes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A non-default access rule was requested but the authenticator does not define it.
    #[error("access rule '{rule}' is not defined on authenticator '{authenticator}'")]
    MissingAccessRule {
        /// Authenticator that was consulted.
        authenticator: String,
        /// Rule that was requested.
        rule: String,
    },
    /// An authenticator name does not resolve.
    #[error("authenticator '{name}' is not registered")]
    MissingAuthenticator {
        /// Name that failed to resolve.
        name: String,
    },
    /// A shared action fragment name does not resolve.
    #[error("shared action fragment '{name}' is not defined")]
    InvalidSharedReference {
        /// Fragment name.
        name: String,
    },
    /// An entity name does not resolve.
    #[error("entity '{name}' is not registered")]
    UnknownEntity {
        /// Entity name.
        name: String,
    },
    /// A helper name does not resolve.
    #[error("helper '{name}' is not registered")]
    UnknownHelper {
        /// Helper name.
        name: String,
    },
    /// An action raised an error code it never declared.
    #[error("error '{code}' is not declared on action '{action}'")]
    UnknownDeclaredError {
        /// Action name.
        action: String,
        /// Undeclared error code.
        code: String,
    },
    /// `render` was called on an action without a return spec.
    #[error("action '{action}' has no return spec")]
    MissingReturnSpec {
        /// Action name.
        action: String,
    },
    /// A custom filter block was declared for a different collection type.
    #[error("filter block for '{attribute}' does not accept this collection type")]
    FilterCollectionMismatch {
        /// Filterable attribute name.
        attribute: String,
    },
}

/// Error returned by action bodies, hooks, helpers and projection blocks.
#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    /// Routine request failure; becomes an envelope.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Wiring bug; propagates out of dispatch.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Foreign error type; translated by a registered external-error mapping or propagated.
    #[error("external error: {0}")]
    External(Box<dyn StdError + Send + Sync + 'static>),
}

impl ActionError {
    /// Wrap a foreign error so registered translators can see it.
    pub fn external<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External(Box::new(err))
    }

    /// True if this is a request-kind error.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// True if this is a configuration-kind error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Borrow the request error if present.
    pub fn as_request(&self) -> Option<&RequestError> {
        match self {
            Self::Request(e) => Some(e),
            _ => None,
        }
    }
}

/// Fatal outcome of a dispatch: anything that must not be reported as a normal failure.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// No controller with this name.
    #[error("controller '{0}' is not registered")]
    UnknownController(String),
    /// The controller has no action with this name.
    #[error("action '{action}' is not defined on controller '{controller}'")]
    UnknownAction {
        /// Controller name.
        controller: String,
        /// Action name.
        action: String,
    },
    /// A wiring bug surfaced during the request.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    /// A foreign error with no registered translator.
    #[error("unhandled external error: {0}")]
    Unhandled(Box<dyn StdError + Send + Sync + 'static>),
}

impl DispatchError {
    /// True if this wraps a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Borrow the configuration error if present.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tags_match_variants() {
        assert_eq!(RequestError::access_denied("X", "y").status(), "access-denied");
        assert_eq!(RequestError::not_found("user").status(), "not-found");
        assert_eq!(RequestError::validation(json!({})).status(), "validation-error");
        assert_eq!(
            RequestError::parameter(ParameterErrorCode::InvalidType, "bad").status(),
            "parameter-error"
        );
        assert_eq!(
            RequestError::filter(FilterErrorCode::ArrayNeeded, "bad").status(),
            "filter-error"
        );
        assert_eq!(RequestError::structured("Oops", "bad").status(), "request-error");
    }

    #[test]
    fn structured_payload_keeps_code_over_data() {
        let mut data = Map::new();
        data.insert("code".into(), json!("shadowed"));
        data.insert("id".into(), json!(7));
        let err = RequestError::Structured { code: "Gone".into(), message: "gone".into(), data };
        let payload = err.payload();
        assert_eq!(payload["code"], "Gone");
        assert_eq!(payload["id"], 7);
        assert!(payload.is_object());
    }

    #[test]
    fn action_error_classification() {
        let req: ActionError = RequestError::not_found("x").into();
        assert!(req.is_request());
        let cfg: ActionError = ConfigError::UnknownEntity { name: "x".into() }.into();
        assert!(cfg.is_config());
        let ext = ActionError::external(std::io::Error::new(std::io::ErrorKind::Other, "io"));
        assert!(!ext.is_request() && !ext.is_config());
    }
}
