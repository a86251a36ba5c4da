//! Controllers group actions and the hooks that run before them.

use crate::action::{Action, ActionBuilder, Fragment, FragmentScope};
use crate::environment::Environment;
use crate::error::{ActionError, ConfigError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Before-hook body.
pub type HookFn = Arc<dyn Fn(&mut Environment) -> Result<(), ActionError> + Send + Sync>;

/// A hook run before matching actions.
#[derive(Clone)]
pub struct BeforeHook {
    actions: Vec<String>,
    body: HookFn,
}

impl BeforeHook {
    /// An empty filter matches every action.
    pub fn applies_to(&self, action: &str) -> bool {
        self.actions.is_empty() || self.actions.iter().any(|a| a == action)
    }

    /// Action-name filter.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub(crate) fn run(&self, env: &mut Environment) -> Result<(), ActionError> {
        (self.body)(env)
    }
}

impl fmt::Debug for BeforeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeHook").field("actions", &self.actions).finish()
    }
}

/// Named group of actions.
#[derive(Clone, Default)]
pub struct Controller {
    name: String,
    description: Option<String>,
    actions: BTreeMap<String, Arc<Action>>,
    before_hooks: Vec<BeforeHook>,
    authenticator: Option<String>,
    access_rule: Option<String>,
    fragments: HashMap<String, Fragment>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("before_hooks", &self.before_hooks)
            .field("authenticator", &self.authenticator)
            .field("access_rule", &self.access_rule)
            .finish()
    }
}

impl Controller {
    /// Empty controller.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Controller name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Action by name.
    pub fn action(&self, name: &str) -> Option<&Arc<Action>> {
        self.actions.get(name)
    }

    /// Action names, sorted.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub(crate) fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    /// Hooks applying to `action`, in registration order.
    pub fn hooks_for<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a BeforeHook> + 'a {
        self.before_hooks.iter().filter(move |hook| hook.applies_to(action))
    }

    /// Authenticator named for every action in this controller.
    pub fn authenticator_override(&self) -> Option<&str> {
        self.authenticator.as_deref()
    }

    /// Access rule named for every action in this controller.
    pub fn access_rule_override(&self) -> Option<&str> {
        self.access_rule.as_deref()
    }
}

/// Declaration API handed to `Registry::define_controller`.
pub struct ControllerBuilder<'a> {
    controller: &'a mut Controller,
    global: &'a HashMap<String, Fragment>,
    errors: Vec<ConfigError>,
}

impl<'a> ControllerBuilder<'a> {
    pub(crate) fn new(controller: &'a mut Controller, global: &'a HashMap<String, Fragment>) -> Self {
        Self { controller, global, errors: Vec::new() }
    }

    pub(crate) fn into_errors(self) -> Vec<ConfigError> {
        self.errors
    }

    /// Documentation text.
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.controller.description = Some(text.into());
        self
    }

    /// Authenticator for every action that does not name its own.
    pub fn authenticator(&mut self, name: impl Into<String>) -> &mut Self {
        self.controller.authenticator = Some(name.into());
        self
    }

    /// Access rule for every action that does not name its own.
    pub fn access_rule(&mut self, name: impl Into<String>) -> &mut Self {
        self.controller.access_rule = Some(name.into());
        self
    }

    /// Controller-local fragment; shadows a registry-wide fragment of the same name.
    pub fn shared_action<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ActionBuilder) + Send + Sync + 'static,
    {
        self.controller.fragments.insert(name.into(), Arc::new(f));
        self
    }

    /// Hook run before the listed actions.
    pub fn before<F>(&mut self, actions: &[&str], f: F) -> &mut Self
    where
        F: Fn(&mut Environment) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.controller.before_hooks.push(BeforeHook {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            body: Arc::new(f),
        });
        self
    }

    /// Hook run before every action.
    pub fn before_all<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut Environment) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.before(&[], f)
    }

    /// Define an action. Redefining a name replaces the earlier action.
    pub fn action<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnOnce(&mut ActionBuilder),
    {
        let name = name.into();
        let scope = FragmentScope {
            local: self.controller.fragments.clone(),
            global: self.global.clone(),
        };
        let mut builder = ActionBuilder::new(name.clone(), scope);
        f(&mut builder);
        let (action, errors) = builder.finish();
        self.errors.extend(errors);
        if self.controller.actions.insert(name.clone(), Arc::new(action)).is_some() {
            warn!(
                target: "lanyard::registry",
                controller = %self.controller.name,
                action = %name,
                "action redefined; last definition wins"
            );
        }
        self
    }
}
