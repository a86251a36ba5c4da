//! Tower integration: dispatch as a `Service` over the current registry snapshot.

use crate::dispatch::dispatch;
use crate::envelope::ResultEnvelope;
use crate::error::DispatchError;
use crate::handle::RegistryHandle;
use crate::request::RequestContext;
use futures::future::BoxFuture;
use serde_json::Value;
use std::task::{Context, Poll};
use tower::Service;

/// One call into the pipeline, as built by a transport.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Controller name.
    pub controller: String,
    /// Action name.
    pub action: String,
    /// Raw client parameters (a JSON object).
    pub params: Value,
    /// Caller context.
    pub context: RequestContext,
}

impl DispatchRequest {
    /// Request with no parameters and an anonymous context.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            params: Value::Object(Default::default()),
            context: RequestContext::new(),
        }
    }

    /// Set the raw parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Set the caller context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// `tower::Service` that dispatches against whatever registry the handle currently holds.
#[derive(Debug, Clone)]
pub struct DispatchService {
    handle: RegistryHandle,
}

impl DispatchService {
    /// Serve requests from `handle`.
    pub fn new(handle: RegistryHandle) -> Self {
        Self { handle }
    }
}

impl Service<DispatchRequest> for DispatchService {
    type Response = ResultEnvelope;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let registry = self.handle.current();
        Box::pin(async move {
            dispatch(&registry, &req.controller, &req.action, req.params, req.context)
        })
    }
}
