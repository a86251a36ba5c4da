//! Per-request context supplied by the transport.

use serde_json::Value;
use std::collections::HashMap;

/// What the transport knows about the caller.
///
/// Header names are case-insensitive. `api_version` is never below 1.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: String,
    identity: Option<Value>,
    api_version: u32,
    headers: HashMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Anonymous request against API version 1 with a fresh request id.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: None,
            api_version: 1,
            headers: HashMap::new(),
        }
    }

    /// Use a caller-supplied request id (e.g. a correlation id from the transport).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Identity resolved by the transport; skips the authenticator's lookup.
    pub fn with_identity(mut self, identity: Value) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Requested API version; values below 1 are raised to 1.
    pub fn with_api_version(mut self, version: u32) -> Self {
        self.api_version = version.max(1);
        self
    }

    /// Add a raw request header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Request id used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity supplied by the transport, if any.
    pub fn identity(&self) -> Option<&Value> {
        self.identity.as_ref()
    }

    /// API version, at least 1.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let ctx = RequestContext::new().with_header("X-Auth-Token", "abc");
        assert_eq!(ctx.header("x-auth-token"), Some("abc"));
        assert_eq!(ctx.header("X-AUTH-TOKEN"), Some("abc"));
        assert_eq!(ctx.header("missing"), None);
    }

    #[test]
    fn api_version_floor_is_one() {
        assert_eq!(RequestContext::new().with_api_version(0).api_version(), 1);
        assert_eq!(RequestContext::new().with_api_version(3).api_version(), 3);
    }
}
