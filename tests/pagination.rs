#![allow(missing_docs)]

mod common;

use common::test_helpers::call;
use lanyard::RequestContext;
use serde_json::json;

fn usernames(data: &serde_json::Value) -> Vec<&str> {
    data.as_array()
        .expect("list returns an array")
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect()
}

#[test]
fn pages_are_sliced_and_flagged() {
    let envelope = call("list", json!({"page": 2, "per_page": 2}), RequestContext::new());
    assert_eq!(envelope.status, "success");
    assert_eq!(usernames(&envelope.data), vec!["grace", "edsger"]);
    assert_eq!(
        envelope.flags["paginated"],
        json!({"page": 2, "per_page": 2, "total_pages": 3, "total_records": 5})
    );
}

#[test]
fn out_of_range_per_page_uses_the_default() {
    for per_page in [json!(0), json!(999)] {
        let envelope = call("list", json!({ "per_page": per_page }), RequestContext::new());
        assert_eq!(envelope.flags["paginated"]["per_page"], 30);
        assert_eq!(envelope.flags["paginated"]["total_pages"], 1);
        assert_eq!(usernames(&envelope.data).len(), 5);
    }
}

#[test]
fn page_defaults_to_one_and_past_the_end_is_empty() {
    let first = call("list", json!({"per_page": "2"}), RequestContext::new());
    assert_eq!(first.flags["paginated"]["page"], 1);
    assert_eq!(usernames(&first.data), vec!["ada", "alan"]);

    let beyond = call("list", json!({"page": 9, "per_page": 2}), RequestContext::new());
    assert!(beyond.data.as_array().unwrap().is_empty());
    assert_eq!(beyond.flags["paginated"]["page"], 9);
}

#[test]
fn items_are_rendered_through_the_return_spec() {
    let envelope = call("list", json!({"per_page": 1, "_full": true}), RequestContext::new());
    assert_eq!(envelope.data[0]["admin"], true);
    assert!(envelope.data[0].get("email").is_none());
}
