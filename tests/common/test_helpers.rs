use lanyard::{
    subject, ActionError, Attribute, Condition, Environment, ErrorSpec, Field, FilterOperator,
    ParamSpec, Paramable, Registry, RequestContext, RequestError, ResultEnvelope, ReturnSpec,
    ValueType,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_TOKEN: &str = "user-token";

/// Failure raised by the fake user store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} is missing")]
    Missing(String),
}

pub fn users() -> Vec<Value> {
    vec![
        json!({"id": 1, "username": "ada", "admin": true, "email": "ada@example.com",
               "bio": "first programmer", "pets": [{"name": "Babbage", "species": "cat"}]}),
        json!({"id": 2, "username": "alan", "admin": false, "email": "alan@example.com",
               "bio": "codebreaker", "pets": []}),
        json!({"id": 3, "username": "grace", "admin": false, "email": "grace@example.com",
               "bio": "compilers", "pets": [{"name": "Cobol", "species": "dog"},
                                            {"name": "Moth", "species": "insect"}]}),
        json!({"id": 4, "username": "edsger", "admin": false, "email": "edsger@example.com",
               "bio": "structured", "pets": []}),
        json!({"id": 5, "username": "barbara", "admin": true, "email": "barbara@example.com",
               "bio": "abstraction", "pets": []}),
    ]
}

fn find_user(env: &Environment) -> Result<Value, ActionError> {
    let name = env.params().get_str("username").unwrap_or_default().to_string();
    users()
        .into_iter()
        .find(|u| u["username"] == name.as_str())
        .ok_or_else(|| RequestError::not_found(format!("user {name}")).into())
}

fn record_hook(env: &mut Environment, name: &str) {
    let mut hooks = env.flag("hooks").and_then(Value::as_array).cloned().unwrap_or_default();
    hooks.push(json!(name));
    env.set_flag("hooks", Value::Array(hooks));
}

fn is_admin(env: &Environment) -> bool {
    env.identity().and_then(|i| i.get("admin")).and_then(Value::as_bool) == Some(true)
}

pub fn declare_authenticator(registry: &mut Registry) {
    registry.define_authenticator("default", |a| {
        a.description("Session token authentication")
            .header("X-Token", "Session token issued at login")
            .error("InvalidToken", "The token is not recognized")
            .lookup(|req| match req.header("x-token") {
                Some(ADMIN_TOKEN) => Ok(Some(json!({"id": 1, "admin": true}))),
                Some(USER_TOKEN) => Ok(Some(json!({"id": 2, "admin": false}))),
                Some(_) => {
                    Err(RequestError::access_denied("InvalidToken", "The token is not recognized"))
                }
                None => Ok(None),
            })
            .rule("must_be_admin", "MustBeAdmin", "You must be an admin", is_admin)
            .rule("logged_in", "LoginRequired", "You must be logged in", |env| {
                env.identity().is_some()
            });
    });
}

pub fn declare_entities(registry: &mut Registry) {
    registry.define_entity("pet", |e| {
        e.basic(Attribute::field("name")).full(Attribute::field("species"));
    });
    registry.define_entity("user", |e| {
        e.description("A person with an account")
            .basic(Attribute::field("id").of_type(ValueType::Integer))
            .basic(Attribute::field("username").of_type(ValueType::String))
            .full(Attribute::field("admin").of_type(ValueType::Boolean))
            .group("profile", |g| {
                g.basic(Attribute::field("bio"));
            })
            .condition(Condition::rule("default", "must_be_admin"), |c| {
                c.full(Attribute::field("email"));
            })
            .expansion(Attribute::field("pets").entity("pet"))
            .expand("animals", |env| {
                let count = env
                    .field("pets")
                    .map(Field::into_value)
                    .and_then(|v| v.as_array().map(Vec::len))
                    .unwrap_or(0);
                Ok(json!({ "count": count }))
            });
    });
}

pub fn declare_controllers(registry: &mut Registry) {
    registry
        .shared_action("paging", |a| {
            a.param(ParamSpec::new("page").default(1))
                .param(ParamSpec::new("per_page").description("Records per page"));
        })
        .define_helper("shout", |_, args| {
            Ok(json!(args.first().and_then(Value::as_str).unwrap_or_default().to_uppercase()))
        });

    registry
        .define_controller("users", |c| {
            c.description("User accounts")
                .before(&["edit", "delete"], |env| {
                    record_hook(env, "scoped");
                    Ok(())
                })
                .before_all(|env| {
                    record_hook(env, "all");
                    Ok(())
                })
                .action("list", |a| {
                    a.share("paging")
                        .filterable("username", [FilterOperator::Eq, FilterOperator::StartsWith])
                        .filterable("id", [FilterOperator::Eq, FilterOperator::In, FilterOperator::Gte])
                        .returns(ReturnSpec::array("user").paramable(Paramable::all()))
                        .body(|env, _| {
                            let found = env.filter(users())?;
                            env.paginate(found, 60, |env, user| env.render(subject(user)))
                        });
                })
                .action("show", |a| {
                    a.title("Show a user")
                        .param(ParamSpec::new("username").required().of_type(ValueType::String))
                        .returns(ReturnSpec::object("user").paramable(
                            Paramable::none().allow_full().allow_expansions_only(["animals"]),
                        ))
                        .body(|env, _| {
                            let user = find_user(env)?;
                            env.render(subject(user))
                        });
                })
                .action("edit", |a| {
                    a.access_rule("must_be_admin")
                        .body(|env, _| Ok(env.flag("hooks").cloned().unwrap_or(Value::Null)));
                })
                .action("delete", |a| {
                    a.access_rule("must_be_admin")
                        .body(|env, _| Ok(env.flag("hooks").cloned().unwrap_or(Value::Null)));
                })
                .action("create", |a| {
                    a.param(ParamSpec::new("username").required())
                        .error(
                            "UsernameTaken",
                            ErrorSpec::new("That username is already taken")
                                .attribute("username", "The rejected username"),
                        )
                        .body(|env, _| {
                            let name = env.params().get_str("username").unwrap_or_default();
                            if users().iter().any(|u| u["username"] == name) {
                                let mut data = Map::new();
                                data.insert("username".into(), json!(name));
                                return Err(env.declared_error("UsernameTaken", data));
                            }
                            Ok(json!({ "created": name }))
                        });
                })
                .action("shout", |a| {
                    a.param(ParamSpec::new("text").default("hello")).body(|env, _| {
                        let text = env.param("text").cloned().unwrap_or(Value::Null);
                        env.helper("shout", &[text])
                    });
                })
                .action("archived", |a| {
                    a.body(|_, _| Err(ActionError::external(StoreError::Missing("archive".into()))));
                })
                .action("crash", |a| {
                    a.body(|_, _| Err(ActionError::external(std::io::Error::other("disk on fire"))));
                })
                .action("secret", |a| {
                    a.access_rule("nobody_declared_this").body(|_, _| Ok(Value::Null));
                });
        })
        .expect("users controller is valid");
}

/// Registry with every fixture declared.
pub fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    declare_authenticator(&mut registry);
    declare_entities(&mut registry);
    declare_controllers(&mut registry);
    registry.register_external_error::<StoreError, _>(|err| RequestError::not_found(err.to_string()));
    Arc::new(registry)
}

pub fn as_admin() -> RequestContext {
    RequestContext::new().with_header("X-Token", ADMIN_TOKEN)
}

pub fn as_user() -> RequestContext {
    RequestContext::new().with_header("X-Token", USER_TOKEN)
}

/// Route pipeline logs to the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn call(action: &str, params: Value, request: RequestContext) -> ResultEnvelope {
    init_tracing();
    registry().dispatch("users", action, params, request).expect("dispatch should not fail fatally")
}
