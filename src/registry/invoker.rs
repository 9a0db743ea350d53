//! Compiled invocation plan
//!
//! An [`Invoker`] is the compiled form of one routed method: a function
//! value taking the per-connection controller instance, the scalar map
//! and the inbound-stream lookup, and returning the serialized outbound
//! sequence. It captures the handler and the binding plan at build time;
//! no per-call reflection, no shared mutable state, safe to reuse across
//! concurrent connections.

use std::any::Any;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Scalars, BODY_KEY};
use crate::error::{Error, Result};
use crate::flow::Flow;

use super::binder;

/// Looks up the inbound stream for a named parameter. Names without a
/// live slot yield the empty sequence.
pub type InboundFn = Arc<dyn Fn(&str) -> Flow<String> + Send + Sync>;

/// The compiled binding-and-invocation function of one route.
pub type Invoker = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>, Scalars, InboundFn) -> Flow<String> + Send + Sync,
>;

/// Creates the controller instance for one connection.
pub type Factory = Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// Bound arguments of one invocation, handed to the handler.
///
/// The extraction methods implement the scalar binding table; the
/// handler calls the one matching each parameter's declared binding.
pub struct CallContext {
    scalars: Scalars,
    inbound: InboundFn,
}

impl CallContext {
    pub fn new(scalars: Scalars, inbound: InboundFn) -> Self {
        Self { scalars, inbound }
    }

    /// Raw string scalar; empty when absent.
    pub fn text(&self, name: &str) -> String {
        binder::text(&self.scalars, name)
    }

    /// `FromStr` scalar; zero value on failure or absence.
    pub fn parsed<T: FromStr + Default>(&self, name: &str) -> T {
        binder::parsed(&self.scalars, name)
    }

    /// JSON-primitive scalar (value wrapped in quotes before decoding).
    pub fn quoted<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        binder::quoted(&self.scalars, name)
    }

    /// JSON scalar; zero value when absent, decode errors propagate.
    pub fn json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        binder::json(&self.scalars, name)
    }

    /// The request body, JSON-decoded.
    pub fn body<T: DeserializeOwned + Default>(&self) -> Result<T> {
        binder::json(&self.scalars, BODY_KEY)
    }

    /// The request body as raw text; empty when absent.
    pub fn body_text(&self) -> String {
        binder::text(&self.scalars, BODY_KEY)
    }

    /// Named inbound stream with each item JSON-decoded into `T`.
    pub fn inbound<T: DeserializeOwned + Send + 'static>(&self, name: &str) -> Flow<T> {
        let raw = (self.inbound)(name);
        Box::pin(raw.map(|item| {
            item.and_then(|payload| {
                serde_json::from_str(&payload)
                    .map_err(|e| Error::Decode(format!("stream item: {}", e)))
            })
        }))
    }
}

/// Serialize handler items one by one into the wire representation.
pub(crate) fn serialize_items<T: Serialize + Send + 'static>(items: Flow<T>) -> Flow<String> {
    Box::pin(items.map(|item| {
        item.and_then(|value| {
            serde_json::to_string(&value)
                .map_err(|e| Error::Decode(format!("serialize item: {}", e)))
        })
    }))
}

/// Guard compiled in front of plain-HTTP routes: the second emission is
/// replaced by a terminal protocol error.
pub(crate) fn enforce_single(inner: Flow<String>) -> Flow<String> {
    Box::pin(SingleValueGuard {
        inner,
        emitted: false,
        done: false,
    })
}

struct SingleValueGuard {
    inner: Flow<String>,
    emitted: bool,
    done: bool,
}

impl Stream for SingleValueGuard {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(value))) => {
                if this.emitted {
                    this.done = true;
                    Poll::Ready(Some(Err(Error::Protocol(
                        "plain HTTP method emitted more than one value".into(),
                    ))))
                } else {
                    this.emitted = true;
                    Poll::Ready(Some(Ok(value)))
                }
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow;
    use futures_util::StreamExt;

    fn no_inbound() -> InboundFn {
        Arc::new(|_| flow::empty())
    }

    #[tokio::test]
    async fn test_serialize_items() {
        let items = flow::iter(vec![1, 2]);
        let serialized: Vec<String> = serialize_items(items)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(serialized, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_inbound_items_are_decoded() {
        let scalars = Scalars::new();
        let inbound: InboundFn = Arc::new(|name| {
            assert_eq!(name, "left");
            flow::iter(vec!["3".to_string(), "4".to_string()])
        });
        let call = CallContext::new(scalars, inbound);

        let values: Vec<i32> = call
            .inbound::<i32>("left")
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(values, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_inbound_decode_failure_is_an_error_event() {
        let inbound: InboundFn = Arc::new(|_| flow::once("not a number".to_string()));
        let call = CallContext::new(Scalars::new(), inbound);

        let mut values = call.inbound::<i32>("x");
        assert!(matches!(values.next().await, Some(Err(Error::Decode(_)))));
    }

    #[tokio::test]
    async fn test_single_value_guard_passes_one() {
        let guarded = enforce_single(flow::once("1".to_string()));
        let items: Vec<_> = guarded.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "1");
    }

    #[tokio::test]
    async fn test_single_value_guard_rejects_second() {
        let guarded = enforce_single(flow::iter(vec!["1".to_string(), "2".to_string()]));
        let items: Vec<_> = guarded.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_call_context_scalar_paths() {
        let mut scalars = Scalars::new();
        scalars.insert("msg".into(), "hi".into());
        scalars.insert("n".into(), "7".into());
        let call = CallContext::new(scalars, no_inbound());

        assert_eq!(call.text("msg"), "hi");
        assert_eq!(call.parsed::<i32>("n"), 7);
        assert_eq!(call.parsed::<i32>("absent"), 0);
    }
}
