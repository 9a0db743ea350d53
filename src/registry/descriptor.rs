//! Controller and method descriptors
//!
//! Registration is descriptor-driven: instead of reflecting over method
//! signatures at runtime, the caller states the route suffix, the
//! parameter plan and the handler for each exposed method, and the
//! registry compiles those into invokers once at build time.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::flow::{self, Flow};

use super::invoker::{serialize_items, CallContext};

/// How one parameter obtains its value. Mirrors the fixed binding table
/// evaluated at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Raw string scalar; the empty string when absent.
    Text,
    /// `FromStr` scalar (numeric, boolean, UUID); zero value on failure.
    Parsed,
    /// JSON primitive (datetime, enum by name): the raw value is wrapped
    /// in double quotes before decoding.
    Quoted,
    /// Any other scalar: the raw value is JSON-decoded as-is.
    Json,
    /// Named inbound stream; each item is JSON-decoded.
    Stream,
}

/// One parameter of a routed method.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub binding: Binding,
    /// Marked as body-sourced: the value is read from the request body.
    pub from_body: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            binding,
            from_body: false,
        }
    }

    pub fn body(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            binding,
            from_body: true,
        }
    }
}

pub(crate) type ErasedHandler<C> =
    Arc<dyn Fn(Arc<C>, CallContext) -> Flow<String> + Send + Sync>;

/// One routed method: suffix, parameter plan, handler.
pub struct MethodDescriptor<C> {
    pub(crate) suffix: String,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) plain_http: bool,
    pub(crate) handler: Option<ErasedHandler<C>>,
}

impl<C: Send + Sync + 'static> MethodDescriptor<C> {
    /// A method routed under `suffix`. The empty suffix is permitted; the
    /// method is then reachable at the controller prefix itself.
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            params: Vec::new(),
            plain_http: false,
            handler: None,
        }
    }

    /// Add a parameter with an explicit spec.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Raw string scalar parameter.
    pub fn text(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::new(name, Binding::Text))
    }

    /// `FromStr` scalar parameter (numeric, boolean, UUID).
    pub fn parsed(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::new(name, Binding::Parsed))
    }

    /// JSON-primitive scalar parameter.
    pub fn quoted(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::new(name, Binding::Quoted))
    }

    /// JSON-decoded scalar parameter.
    pub fn json(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::new(name, Binding::Json))
    }

    /// Named inbound stream parameter.
    pub fn inbound(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::new(name, Binding::Stream))
    }

    /// Body-sourced JSON parameter. At most one per method.
    pub fn body_json(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::body(name, Binding::Json))
    }

    /// Body-sourced raw text parameter. At most one per method.
    pub fn body_text(self, name: impl Into<String>) -> Self {
        self.param(ParamSpec::body(name, Binding::Text))
    }

    /// Advisory plain-HTTP marker: the method must produce at most one
    /// value; a second emission is a protocol violation surfaced as an
    /// error event.
    pub fn plain_http(mut self) -> Self {
        self.plain_http = true;
        self
    }

    /// Install the handler. Items are serialized through JSON one by one;
    /// a synchronous `Err` becomes a one-shot error sequence.
    pub fn handler<T, F>(mut self, f: F) -> Self
    where
        T: Serialize + Send + 'static,
        F: Fn(Arc<C>, CallContext) -> Result<Flow<T>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(move |controller, call| {
            match f(controller, call) {
                Ok(items) => serialize_items(items),
                Err(e) => flow::throw(e),
            }
        }));
        self
    }
}

/// One controller: a path prefix, an instance factory and its routed
/// methods. The factory runs once per connection per route.
pub struct ControllerDescriptor<C> {
    pub(crate) prefix: String,
    pub(crate) factory: Arc<dyn Fn() -> Arc<C> + Send + Sync>,
    pub(crate) methods: Vec<MethodDescriptor<C>>,
}

impl<C: Send + Sync + 'static> ControllerDescriptor<C> {
    pub fn new<F>(prefix: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            factory: Arc::new(move || Arc::new(factory())),
            methods: Vec::new(),
        }
    }

    /// Add a routed method.
    pub fn route(mut self, method: MethodDescriptor<C>) -> Self {
        self.methods.push(method);
        self
    }
}
