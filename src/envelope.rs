//! Result envelope returned by every dispatch that does not fail fatally.

use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Status tag of a successful dispatch.
pub const SUCCESS: &str = "success";

/// `{status, time, flags, data}`; headers travel beside the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// `"success"` or an error status tag.
    pub status: String,
    /// Elapsed wall-clock seconds.
    pub time: f64,
    /// Flags set by the action (pagination, filters, ...).
    #[serde(default)]
    pub flags: Map<String, Value>,
    /// Transport-level response headers; never serialized into the body.
    #[serde(skip)]
    pub headers: BTreeMap<String, String>,
    /// Final body result, or the error payload.
    pub data: Value,
}

impl ResultEnvelope {
    /// Envelope for a completed action.
    pub fn success(
        data: Value,
        time: f64,
        flags: Map<String, Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self { status: SUCCESS.to_string(), time, flags, headers, data }
    }

    /// Envelope for a request-kind failure.
    pub fn failure(
        error: &RequestError,
        time: f64,
        flags: Map<String, Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self { status: error.status().to_string(), time, flags, headers, data: error.payload() }
    }

    /// True for `"success"`.
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS
    }
}
