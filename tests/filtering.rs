#![allow(missing_docs)]

mod common;

use common::test_helpers::call;
use lanyard::RequestContext;
use serde_json::json;

fn ids(data: &serde_json::Value) -> Vec<i64> {
    data.as_array().unwrap().iter().map(|u| u["id"].as_i64().unwrap()).collect()
}

#[test]
fn shorthand_filters_use_the_default_operator() {
    let envelope = call("list", json!({"filters": {"username": "grace"}}), RequestContext::new());
    assert_eq!(ids(&envelope.data), vec![3]);
    assert_eq!(envelope.flags["filters"], json!({"username": {"eq": "grace"}}));
    assert_eq!(envelope.flags["paginated"]["total_records"], 1);
}

#[test]
fn explicit_operators_narrow_together() {
    let envelope = call(
        "list",
        json!({"filters": {"username": {"starts_with": "a"}, "id": {"gte": 2}}}),
        RequestContext::new(),
    );
    assert_eq!(ids(&envelope.data), vec![2]);

    let envelope =
        call("list", json!({"filters": {"id": {"in": [1, 4, 9]}}}), RequestContext::new());
    assert_eq!(ids(&envelope.data), vec![1, 4]);
}

#[test]
fn filters_flag_is_set_without_filters() {
    let envelope = call("list", json!({}), RequestContext::new());
    assert_eq!(envelope.flags["filters"], json!({}));
}

#[test]
fn in_without_an_array_needs_an_array() {
    let envelope = call("list", json!({"filters": {"id": {"in": 3}}}), RequestContext::new());
    assert_eq!(envelope.status, "filter-error");
    assert_eq!(envelope.data["code"], "ArrayNeeded");
}

#[test]
fn rejected_filters_report_their_code() {
    let cases = [
        (json!({"email": "x"}), "UnsupportedAttribute"),
        (json!({"username": {"gt": "a"}}), "InvalidOperator"),
        (json!({"username": {"like": "a"}}), "InvalidOperator"),
    ];
    for (filters, code) in cases {
        let envelope = call("list", json!({ "filters": filters }), RequestContext::new());
        assert_eq!(envelope.status, "filter-error");
        assert_eq!(envelope.data["code"], code);
    }

    let malformed = call("list", json!({"filters": "username=ada"}), RequestContext::new());
    assert_eq!(malformed.data["code"], "MalformedFilters");
}
