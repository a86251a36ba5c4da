//! Authenticators: identity lookup plus named boolean access rules.
//!
//! Resolution order for an action:
//! - authenticator: action override, then controller override, then the registry's
//!   `default` authenticator, else none at all.
//! - access rule: action override, then controller override, then `"default"`.
//!
//! A `"default"` rule that was never declared passes everyone. Any other undeclared rule is
//! a configuration bug and surfaces as [`ConfigError::MissingAccessRule`], never as a denial.

use crate::action::Action;
use crate::controller::Controller;
use crate::environment::Environment;
use crate::error::{ConfigError, RequestError};
use crate::registry::Registry;
use crate::request::RequestContext;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Name of the implicit access rule.
pub const DEFAULT_RULE: &str = "default";
/// Name of the authenticator used when neither action nor controller picks one.
pub const DEFAULT_AUTHENTICATOR: &str = "default";

/// Resolves the caller's identity from the raw request.
pub type LookupFn = Arc<dyn Fn(&RequestContext) -> Result<Option<Value>, RequestError> + Send + Sync>;
/// Access rule predicate.
pub type RuleFn = Arc<dyn Fn(&Environment) -> bool + Send + Sync>;

/// A named access rule.
#[derive(Clone)]
pub struct AccessRule {
    name: String,
    error_code: String,
    description: String,
    predicate: RuleFn,
}

impl AccessRule {
    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Code reported in the access-denied payload.
    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    /// Message reported in the access-denied payload.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the predicate.
    pub fn allows(&self, env: &Environment) -> bool {
        (self.predicate)(env)
    }

    /// The error a failed check turns into.
    pub fn denial(&self) -> RequestError {
        RequestError::access_denied(self.error_code.clone(), self.description.clone())
    }
}

impl std::fmt::Debug for AccessRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessRule")
            .field("name", &self.name)
            .field("error_code", &self.error_code)
            .field("description", &self.description)
            .finish()
    }
}

/// Identity resolver plus its access rules.
#[derive(Clone, Default)]
pub struct Authenticator {
    name: String,
    description: Option<String>,
    headers: Vec<(String, String)>,
    errors: BTreeMap<String, String>,
    lookup: Option<LookupFn>,
    rules: HashMap<String, AccessRule>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rules: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        rules.sort_unstable();
        f.debug_struct("Authenticator")
            .field("name", &self.name)
            .field("lookup", &self.lookup.is_some())
            .field("rules", &rules)
            .finish()
    }
}

impl Authenticator {
    /// Empty authenticator with no lookup and no rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Authenticator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Documented request headers as `(name, description)`.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Documented error catalog, code to description.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&AccessRule> {
        self.rules.get(name)
    }

    /// Rule names, sorted.
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// True if this authenticator can resolve identities itself.
    pub fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// Resolve the caller's identity. Without a lookup the result is `Ok(None)`.
    pub fn lookup(&self, request: &RequestContext) -> Result<Option<Value>, RequestError> {
        match &self.lookup {
            Some(lookup) => lookup(request),
            None => Ok(None),
        }
    }

    /// Evaluate a rule for the environment's identity.
    pub fn evaluate(&self, rule: &str, env: &Environment) -> Result<bool, ConfigError> {
        match self.rules.get(rule) {
            Some(r) => Ok(r.allows(env)),
            None if rule == DEFAULT_RULE => Ok(true),
            None => Err(ConfigError::MissingAccessRule {
                authenticator: self.name.clone(),
                rule: rule.to_string(),
            }),
        }
    }
}

/// Declaration API handed to `Registry::define_authenticator`.
pub struct AuthenticatorBuilder<'a> {
    auth: &'a mut Authenticator,
}

impl<'a> AuthenticatorBuilder<'a> {
    pub(crate) fn new(auth: &'a mut Authenticator) -> Self {
        Self { auth }
    }

    /// Documentation text.
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.auth.description = Some(text.into());
        self
    }

    /// Document a request header the lookup reads.
    pub fn header(&mut self, name: impl Into<String>, description: impl Into<String>) -> &mut Self {
        self.auth.headers.push((name.into(), description.into()));
        self
    }

    /// Document an error code the lookup may raise.
    pub fn error(&mut self, code: impl Into<String>, description: impl Into<String>) -> &mut Self {
        self.auth.errors.insert(code.into(), description.into());
        self
    }

    /// Identity lookup. Return `Ok(None)` for anonymous callers and an error to reject the
    /// credentials outright.
    pub fn lookup<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RequestContext) -> Result<Option<Value>, RequestError> + Send + Sync + 'static,
    {
        self.auth.lookup = Some(Arc::new(f));
        self
    }

    /// Define (or replace) an access rule.
    pub fn rule<F>(
        &mut self,
        name: impl Into<String>,
        error_code: impl Into<String>,
        description: impl Into<String>,
        predicate: F,
    ) -> &mut Self
    where
        F: Fn(&Environment) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        self.auth.rules.insert(
            name.clone(),
            AccessRule {
                name,
                error_code: error_code.into(),
                description: description.into(),
                predicate: Arc::new(predicate),
            },
        );
        self
    }
}

/// Outcome of authenticator resolution.
#[derive(Debug, Clone)]
pub enum ResolvedAuthenticator {
    /// An authenticator governs the action.
    Found(Arc<Authenticator>),
    /// No authenticator applies; the action is ungated.
    None,
    /// An override names an authenticator that is not registered.
    NotFound(String),
}

impl ResolvedAuthenticator {
    /// The authenticator, if one was found.
    pub fn authenticator(&self) -> Option<&Arc<Authenticator>> {
        match self {
            Self::Found(auth) => Some(auth),
            _ => None,
        }
    }
}

/// Pick the authenticator governing `action`.
pub fn resolve_authenticator(
    registry: &Registry,
    controller: &Controller,
    action: &Action,
) -> ResolvedAuthenticator {
    let named = action.authenticator_override().or_else(|| controller.authenticator_override());
    match named {
        Some(name) => match registry.authenticator(name) {
            Some(auth) => ResolvedAuthenticator::Found(auth.clone()),
            None => ResolvedAuthenticator::NotFound(name.to_string()),
        },
        None => match registry.authenticator(DEFAULT_AUTHENTICATOR) {
            Some(auth) => ResolvedAuthenticator::Found(auth.clone()),
            None => ResolvedAuthenticator::None,
        },
    }
}

/// Pick the access rule governing `action`.
pub fn resolve_access_rule<'a>(controller: &'a Controller, action: &'a Action) -> &'a str {
    action
        .access_rule_override()
        .or_else(|| controller.access_rule_override())
        .unwrap_or(DEFAULT_RULE)
}

/// Evaluate `rule` against the resolved authenticator.
///
/// No authenticator means no gate. A missing authenticator passes the default rule and is a
/// configuration error for any other rule.
pub fn check_access(
    resolved: &ResolvedAuthenticator,
    rule: &str,
    env: &Environment,
) -> Result<bool, ConfigError> {
    match resolved {
        ResolvedAuthenticator::None => Ok(true),
        ResolvedAuthenticator::NotFound(_) if rule == DEFAULT_RULE => Ok(true),
        ResolvedAuthenticator::NotFound(name) => {
            Err(ConfigError::MissingAuthenticator { name: name.clone() })
        }
        ResolvedAuthenticator::Found(auth) => auth.evaluate(rule, env),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestContext;
    use serde_json::json;

    fn admin_auth() -> Authenticator {
        let mut auth = Authenticator::new("default");
        AuthenticatorBuilder::new(&mut auth)
            .error("InvalidToken", "The token is not valid")
            .lookup(|req| match req.header("x-token") {
                Some("admin") => Ok(Some(json!({"admin": true}))),
                Some("user") => Ok(Some(json!({"admin": false}))),
                Some(_) => Err(RequestError::access_denied("InvalidToken", "bad token")),
                None => Ok(None),
            })
            .rule("must_be_admin", "NotAdmin", "Must be an admin", |env| {
                env.identity().and_then(|i| i.get("admin")).and_then(Value::as_bool) == Some(true)
            });
        auth
    }

    fn env_with(identity: Value) -> Environment {
        Environment::new(
            Arc::new(Registry::new()),
            RequestContext::new().with_identity(identity),
        )
    }

    #[test]
    fn undeclared_default_rule_passes() {
        let auth = admin_auth();
        let env = env_with(json!({"admin": false}));
        assert_eq!(auth.evaluate(DEFAULT_RULE, &env), Ok(true));
    }

    #[test]
    fn declared_rule_result_is_returned_exactly() {
        let auth = admin_auth();
        assert_eq!(auth.evaluate("must_be_admin", &env_with(json!({"admin": true}))), Ok(true));
        assert_eq!(auth.evaluate("must_be_admin", &env_with(json!({"admin": false}))), Ok(false));
    }

    #[test]
    fn undeclared_named_rule_is_a_config_error() {
        let auth = admin_auth();
        let err = auth.evaluate("nope", &env_with(json!({}))).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingAccessRule { authenticator: "default".into(), rule: "nope".into() }
        );
    }

    #[test]
    fn lookup_reads_headers() {
        let auth = admin_auth();
        let req = RequestContext::new().with_header("X-Token", "admin");
        assert_eq!(auth.lookup(&req), Ok(Some(json!({"admin": true}))));
        assert_eq!(auth.lookup(&RequestContext::new()), Ok(None));
        let bad = RequestContext::new().with_header("X-Token", "forged");
        assert!(matches!(auth.lookup(&bad), Err(RequestError::AccessDenied { .. })));
    }

    #[test]
    fn check_access_without_authenticators() {
        let env = env_with(json!({}));
        assert_eq!(check_access(&ResolvedAuthenticator::None, "anything", &env), Ok(true));
        let missing = ResolvedAuthenticator::NotFound("ghost".into());
        assert_eq!(check_access(&missing, DEFAULT_RULE, &env), Ok(true));
        assert_eq!(
            check_access(&missing, "admins", &env),
            Err(ConfigError::MissingAuthenticator { name: "ghost".into() })
        );
    }
}
