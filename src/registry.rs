//! The registry: every entity, controller, authenticator, fragment and helper a host declares.
//!
//! A registry is built mutably during load, then frozen behind an `Arc` and shared read-only
//! by all in-flight requests. Hot reload builds a fresh registry and swaps it in through
//! [`RegistryHandle`](crate::RegistryHandle); a loaded registry is never mutated in place.
//!
//! Name handling:
//! - re-declaring an entity or controller merges into the existing definition;
//! - re-declaring an authenticator replaces it (last registration wins, logged at warn).

use crate::action::{ActionBuilder, Fragment};
use crate::authenticator::{
    resolve_access_rule, resolve_authenticator, Authenticator, AuthenticatorBuilder,
    ResolvedAuthenticator, DEFAULT_RULE,
};
use crate::config::LanyardConfig;
use crate::controller::{Controller, ControllerBuilder};
use crate::entity::{Condition, Entity, EntityBuilder};
use crate::envelope::ResultEnvelope;
use crate::environment::Environment;
use crate::error::{ActionError, ConfigError, DispatchError, RequestError};
use crate::request::RequestContext;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Helper callable from action bodies via [`Environment::helper`].
pub type HelperFn = Arc<dyn Fn(&mut Environment, &[Value]) -> Result<Value, ActionError> + Send + Sync>;

type Translator =
    Arc<dyn Fn(&(dyn StdError + Send + Sync + 'static)) -> Option<RequestError> + Send + Sync>;

/// Definitions shared by every request.
#[derive(Clone, Default)]
pub struct Registry {
    config: LanyardConfig,
    controllers: BTreeMap<String, Arc<Controller>>,
    entities: HashMap<String, Arc<Entity>>,
    authenticators: HashMap<String, Arc<Authenticator>>,
    fragments: HashMap<String, Fragment>,
    helpers: HashMap<(Option<String>, String), HelperFn>,
    translators: Vec<Translator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entities: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        entities.sort_unstable();
        let mut authenticators: Vec<&str> = self.authenticators.keys().map(String::as_str).collect();
        authenticators.sort_unstable();
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("entities", &entities)
            .field("authenticators", &authenticators)
            .field("fragments", &self.fragments.len())
            .field("helpers", &self.helpers.len())
            .field("external_errors", &self.translators.len())
            .finish()
    }
}

impl Registry {
    /// Empty registry with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with explicit settings.
    pub fn with_config(config: LanyardConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Settings.
    pub fn config(&self) -> &LanyardConfig {
        &self.config
    }

    /// Declare an entity, or add to an existing one.
    pub fn define_entity<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnOnce(&mut EntityBuilder<'_>),
    {
        let name = name.into();
        let slot = self
            .entities
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Entity::new(name)));
        let mut builder = EntityBuilder::new(Arc::make_mut(slot));
        f(&mut builder);
        self
    }

    /// Declare an authenticator, replacing any earlier one with the same name.
    pub fn define_authenticator<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnOnce(&mut AuthenticatorBuilder<'_>),
    {
        let name = name.into();
        let mut auth = Authenticator::new(name.clone());
        f(&mut AuthenticatorBuilder::new(&mut auth));
        if self.authenticators.insert(name.clone(), Arc::new(auth)).is_some() {
            warn!(
                target: "lanyard::registry",
                authenticator = %name,
                "authenticator redefined; last registration wins"
            );
        }
        self
    }

    /// Declare a controller, or add to an existing one.
    ///
    /// The controller is committed only if every `share` inside it resolved.
    pub fn define_controller<F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, ConfigError>
    where
        F: FnOnce(&mut ControllerBuilder<'_>),
    {
        let name = name.into();
        let mut controller = self
            .controllers
            .get(&name)
            .map(|existing| Controller::clone(existing))
            .unwrap_or_else(|| Controller::new(name.clone()));
        let errors = {
            let mut builder = ControllerBuilder::new(&mut controller, &self.fragments);
            f(&mut builder);
            builder.into_errors()
        };
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        debug!(target: "lanyard::registry", controller = %name, "controller defined");
        self.controllers.insert(name, Arc::new(controller));
        Ok(self)
    }

    /// Registry-wide fragment usable from any action via `share`.
    pub fn shared_action<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ActionBuilder) + Send + Sync + 'static,
    {
        self.fragments.insert(name.into(), Arc::new(f));
        self
    }

    /// Global helper.
    pub fn define_helper<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut Environment, &[Value]) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.helpers.insert((None, name.into()), Arc::new(f));
        self
    }

    /// Helper visible only to actions of `controller`; shadows a global helper of that name.
    pub fn define_controller_helper<F>(
        &mut self,
        controller: impl Into<String>,
        name: impl Into<String>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&mut Environment, &[Value]) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.helpers.insert((Some(controller.into()), name.into()), Arc::new(f));
        self
    }

    /// Translate errors of type `E` raised by actions into request errors.
    ///
    /// Foreign errors reach dispatch as [`ActionError::External`]; the first translator whose
    /// type matches wins. Untranslated foreign errors propagate as
    /// [`DispatchError::Unhandled`].
    pub fn register_external_error<E, F>(&mut self, f: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> RequestError + Send + Sync + 'static,
    {
        self.translators.push(Arc::new(move |err: &(dyn StdError + Send + Sync + 'static)| {
            err.downcast_ref::<E>().map(&f)
        }));
        self
    }

    pub(crate) fn translate_external(
        &self,
        err: &(dyn StdError + Send + Sync + 'static),
    ) -> Option<RequestError> {
        self.translators.iter().find_map(|translate| translate(err))
    }

    /// Entity by name.
    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.get(name)
    }

    /// Controller by name.
    pub fn controller(&self, name: &str) -> Option<&Arc<Controller>> {
        self.controllers.get(name)
    }

    /// Authenticator by name.
    pub fn authenticator(&self, name: &str) -> Option<&Arc<Authenticator>> {
        self.authenticators.get(name)
    }

    /// Helper by name: controller-scoped first, then global.
    pub fn helper(&self, controller: Option<&str>, name: &str) -> Option<&HelperFn> {
        controller
            .and_then(|c| self.helpers.get(&(Some(c.to_string()), name.to_string())))
            .or_else(|| self.helpers.get(&(None, name.to_string())))
    }

    /// Controller names, sorted.
    pub fn controller_names(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    /// Entity names, sorted.
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop every definition, keeping settings.
    pub fn reset(&mut self) {
        *self = Self::with_config(self.config.clone());
    }

    /// Run one action; see [`crate::dispatch`].
    pub fn dispatch(
        self: &Arc<Self>,
        controller: &str,
        action: &str,
        params: Value,
        request: RequestContext,
    ) -> Result<ResultEnvelope, DispatchError> {
        crate::dispatch::dispatch(self, controller, action, params, request)
    }

    /// Report every dangling reference in the loaded definitions.
    pub fn verify(&self) -> Result<(), Vec<ConfigError>> {
        let mut problems = Vec::new();

        let mut entity_names: Vec<&String> = self.entities.keys().collect();
        entity_names.sort_unstable();
        for name in entity_names {
            let entity = &self.entities[name];
            for attribute in entity.all_attributes() {
                if let Some(reference) = attribute.entity_ref() {
                    if !self.entities.contains_key(&reference.name) {
                        problems.push(ConfigError::UnknownEntity { name: reference.name.clone() });
                    }
                }
                self.verify_conditions(attribute.conditions(), &mut problems);
            }
            for expansion in entity.expansions() {
                self.verify_conditions(expansion.conditions(), &mut problems);
            }
        }

        for controller in self.controllers.values() {
            for action in controller.actions() {
                if let Some(returns) = action.returns() {
                    if !self.entities.contains_key(returns.entity()) {
                        problems.push(ConfigError::UnknownEntity { name: returns.entity().to_string() });
                    }
                }
                let rule = resolve_access_rule(controller, action);
                match resolve_authenticator(self, controller, action) {
                    ResolvedAuthenticator::NotFound(name) => {
                        problems.push(ConfigError::MissingAuthenticator { name })
                    }
                    ResolvedAuthenticator::Found(auth) => {
                        if rule != DEFAULT_RULE && auth.rule(rule).is_none() {
                            problems.push(ConfigError::MissingAccessRule {
                                authenticator: auth.name().to_string(),
                                rule: rule.to_string(),
                            });
                        }
                    }
                    ResolvedAuthenticator::None => {}
                }
            }
        }

        problems.dedup();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn verify_conditions(&self, conditions: &[Condition], problems: &mut Vec<ConfigError>) {
        for condition in conditions {
            let Condition::Rule { authenticator, rule } = condition else {
                continue;
            };
            match self.authenticators.get(authenticator) {
                Some(auth) if rule != DEFAULT_RULE && auth.rule(rule).is_none() => {
                    problems.push(ConfigError::MissingAccessRule {
                        authenticator: authenticator.clone(),
                        rule: rule.clone(),
                    })
                }
                None if rule != DEFAULT_RULE => {
                    problems.push(ConfigError::MissingAuthenticator { name: authenticator.clone() })
                }
                _ => {}
            }
        }
    }
}
