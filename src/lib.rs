#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # lanyard
//!
//! Declarative API core: entities describe how domain objects are disclosed, authenticators
//! decide who may call what, and controllers group actions run through a fixed dispatch
//! pipeline that always answers with a result envelope.
//!
//! ## Features
//!
//! - **Entities** with basic/full/expansion tiers, groups, conditions and sub-entities
//! - **Authenticators** with identity lookup and named access rules
//! - **Actions** with validated parameters, declared errors, chained bodies and hooks
//! - **Filtering and pagination** helpers that record what they did as envelope flags
//! - **Hot reload** through an atomically swapped registry snapshot
//! - **Tower** `Service` for plugging the pipeline into any transport
//!
//! ## Quick Start
//!
//! ```rust
//! use lanyard::{Attribute, ParamSpec, Registry, RequestContext, ReturnSpec, subject};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.define_entity("user", |e| {
//!     e.basic(Attribute::field("id")).basic(Attribute::field("username"));
//! });
//! registry
//!     .define_controller("users", |c| {
//!         c.action("show", |a| {
//!             a.param(ParamSpec::new("username").required())
//!                 .returns(ReturnSpec::object("user"))
//!                 .body(|env, _| {
//!                     let name = env.param("username").cloned().unwrap_or_default();
//!                     env.render(subject(json!({"id": 1, "username": name, "password": "x"})))
//!                 });
//!         });
//!     })
//!     .unwrap();
//!
//! let registry = Arc::new(registry);
//! let envelope = registry
//!     .dispatch("users", "show", json!({"username": "ada"}), RequestContext::new())
//!     .unwrap();
//! assert_eq!(envelope.status, "success");
//! assert_eq!(envelope.data, json!({"id": 1, "username": "ada"}));
//! ```

pub mod action;
pub mod authenticator;
pub mod collection;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod entity;
pub mod envelope;
pub mod environment;
pub mod error;
pub mod filter;
pub mod handle;
pub mod params;
pub mod projection;
pub mod registry;
pub mod request;
pub mod service;
pub mod subject;

// Re-exports
pub use action::{
    Action, ActionBuilder, BodyFn, ErrorSpec, ExpansionPolicy, FilterSpec, Paramable, ReturnKind,
    ReturnSpec,
};
pub use authenticator::{
    AccessRule, Authenticator, AuthenticatorBuilder, ResolvedAuthenticator, DEFAULT_AUTHENTICATOR,
    DEFAULT_RULE,
};
pub use collection::{Collection, Pagination};
pub use config::LanyardConfig;
pub use controller::{BeforeHook, Controller, ControllerBuilder};
pub use dispatch::{dispatch, Stage};
pub use entity::{Attribute, Condition, Entity, EntityBuilder, Tier};
pub use envelope::ResultEnvelope;
pub use environment::Environment;
pub use error::{
    ActionError, ConfigError, DispatchError, FilterErrorCode, ParameterErrorCode, RequestError,
};
pub use filter::FilterOperator;
pub use handle::RegistryHandle;
pub use params::{ParamSet, ParamSpec, ValueType};
pub use projection::{project, ExpansionSelection, NamedExpansion, ProjectOptions};
pub use registry::Registry;
pub use request::RequestContext;
pub use service::{DispatchRequest, DispatchService};
pub use subject::{subject, Field, Subject, SubjectRef};
