#![allow(missing_docs)]

mod common;

use common::test_helpers::{as_user, call};
use jsonschema::JSONSchema;
use lanyard::RequestContext;
use serde_json::json;

fn compiled() -> JSONSchema {
    let raw_schema = include_str!("../schemas/result-envelope.schema.json");
    let schema_val: serde_json::Value = serde_json::from_str(raw_schema).unwrap();
    JSONSchema::compile(&schema_val).unwrap()
}

#[test]
fn dispatched_envelopes_match_schema() {
    let compiled = compiled();
    let envelopes = [
        call("list", json!({"per_page": 2, "filters": {"id": {"gte": 2}}}), RequestContext::new()),
        call("show", json!({"username": "ada", "_expansions": true}), RequestContext::new()),
        call("show", json!({}), RequestContext::new()),
        call("show", json!({"username": "nobody"}), RequestContext::new()),
        call("edit", json!({}), as_user()),
        call("create", json!({"username": "ada"}), RequestContext::new()),
        call("list", json!({"filters": {"id": {"in": 1}}}), RequestContext::new()),
    ];

    for envelope in envelopes {
        assert_valid(&compiled, serde_json::to_value(&envelope).unwrap());
    }
}

#[test]
fn schema_rejects_error_envelopes_without_object_payloads() {
    let compiled = compiled();
    let bad = json!({"status": "not-found", "time": 0.1, "flags": {}, "data": "missing"});
    assert!(compiled.validate(&bad).is_err());
    let unknown = json!({"status": "teapot", "time": 0.1, "flags": {}, "data": {}});
    assert!(compiled.validate(&unknown).is_err());
}

fn assert_valid(schema: &JSONSchema, value: serde_json::Value) {
    if let Err(errs) = schema.validate(&value) {
        let msg = errs.map(|e| e.to_string()).collect::<Vec<_>>().join(", ");
        panic!("{}", msg);
    }
}
