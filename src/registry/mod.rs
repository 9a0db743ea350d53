//! Route registry
//!
//! Responsibilities:
//! - Compose full paths from route prefix, controller prefix, method suffix
//! - Validate parameter plans (body rules) at build time
//! - Compile one Invoker per routed method
//! - Exact-match lookup at dispatch time
//!
//! The registry is immutable after construction and shared read-only
//! across connections; lookup needs no lock.

mod binder;
mod descriptor;
mod invoker;

pub use binder::{json as bind_json, parsed as bind_parsed, quoted as bind_quoted, text as bind_text};
pub use descriptor::{Binding, ControllerDescriptor, MethodDescriptor, ParamSpec};
pub use invoker::{CallContext, Factory, InboundFn, Invoker};

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::flow;

use invoker::enforce_single;

/// One path bound to one controller method.
pub struct Route {
    pub path: String,
    pub invoker: Invoker,
    pub factory: Factory,
    /// Names of the method's inbound stream parameters.
    pub inbound_params: Vec<String>,
    /// The route declares a body-sourced parameter; the middleware reads
    /// the request body before dispatch.
    pub has_body: bool,
    /// Advisory single-value marker.
    pub plain_http: bool,
}

/// Immutable path-to-route table.
pub struct Registry {
    routes: HashMap<String, Arc<Route>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            route_prefix: String::new(),
            routes: HashMap::new(),
            error: None,
        }
    }

    /// Exact-match lookup on the absolute request path.
    pub fn route(&self, path: &str) -> Option<&Arc<Route>> {
        self.routes.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder collecting controllers; the first registration error is held
/// and reported by `build`.
pub struct RegistryBuilder {
    route_prefix: String,
    routes: HashMap<String, Arc<Route>>,
    error: Option<Error>,
}

impl RegistryBuilder {
    /// Path prefix applied ahead of every controller prefix.
    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    /// Register every routed method of one controller.
    pub fn controller<C: Send + Sync + 'static>(
        mut self,
        controller: ControllerDescriptor<C>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let ControllerDescriptor {
            prefix,
            factory,
            methods,
        } = controller;

        for method in methods {
            let path = compose_path(&[&self.route_prefix, &prefix, &method.suffix]);
            if let Err(e) = self.add_method(path, Arc::clone(&factory), method) {
                self.error = Some(e);
                return self;
            }
        }
        self
    }

    pub fn build(self) -> Result<Registry> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Registry {
            routes: self.routes,
        })
    }

    fn add_method<C: Send + Sync + 'static>(
        &mut self,
        path: String,
        factory: Arc<dyn Fn() -> Arc<C> + Send + Sync>,
        method: MethodDescriptor<C>,
    ) -> Result<()> {
        if self.routes.contains_key(&path) {
            return Err(Error::Registration(format!("duplicate route: {}", path)));
        }

        let mut inbound_params = Vec::new();
        let mut has_body = false;
        for spec in &method.params {
            if spec.from_body {
                if spec.binding == Binding::Stream {
                    return Err(Error::Registration(format!(
                        "{}: body parameter '{}' cannot be a stream",
                        path, spec.name
                    )));
                }
                if has_body {
                    return Err(Error::Registration(format!(
                        "{}: at most one body parameter",
                        path
                    )));
                }
                has_body = true;
            } else if spec.binding == Binding::Stream {
                inbound_params.push(spec.name.clone());
            }
        }

        let handler = method.handler.ok_or_else(|| {
            Error::Registration(format!("{}: method has no handler", path))
        })?;

        let plain_http = method.plain_http;
        let invoker: Invoker = Arc::new(move |controller, scalars, inbound| {
            let controller = match controller.downcast::<C>() {
                Ok(c) => c,
                Err(_) => {
                    return flow::throw(Error::Method(
                        "controller instance does not match route".into(),
                    ))
                }
            };
            let outbound = handler(controller, CallContext::new(scalars, inbound));
            if plain_http {
                enforce_single(outbound)
            } else {
                outbound
            }
        });

        let erased_factory: Factory =
            Arc::new(move || factory() as Arc<dyn Any + Send + Sync>);

        debug!(
            "registered route {} (inbound: {:?}, body: {})",
            path, inbound_params, has_body
        );

        self.routes.insert(
            path.clone(),
            Arc::new(Route {
                path,
                invoker,
                factory: erased_factory,
                inbound_params,
                has_body,
                plain_http,
            }),
        );
        Ok(())
    }
}

/// `'/' + join('/', nonEmpty(trim('/', parts...)))`
fn compose_path(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}
