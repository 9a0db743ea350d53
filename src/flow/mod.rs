//! Flow - lazy asynchronous sequences
//!
//! A [`Flow`] is the framework's rendering of a lazy, asynchronous
//! sequence of typed values: `Ok` items are values, a single `Err` is the
//! terminal error, end-of-stream is completion. Controller methods return
//! flows; inbound stream parameters arrive as flows.
//!
//! The delivery side of an inbound parameter is an [`Observer`]: the demux
//! pump pushes peer events into it, the method consumes the matching flow.
//! Two backings implement the pair:
//!
//! - [`QueuedSubject`]: buffers events until the flow is first polled,
//!   then forwards directly. The default.
//! - [`SingleSubscriberProxy`]: blocks delivery until the flow is first
//!   polled; dropping the flow fires a disposal signal.

mod proxy;
mod subject;

pub use proxy::SingleSubscriberProxy;
pub use subject::QueuedSubject;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};

use crate::error::{Error, Result};

/// A lazy asynchronous sequence.
///
/// Emits zero or more `Ok` items followed by at most one terminal event:
/// an `Err` item (error) or the end of the stream (completion).
pub type Flow<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Delivery side of an inbound parameter stream.
///
/// The demux pump drives this; the matching [`Flow`] is what the
/// controller method consumes.
#[async_trait]
pub trait Observer<T>: Send + Sync {
    /// Deliver the next item. Dropped after a terminal event.
    async fn on_next(&self, item: T);

    /// Terminate the stream with an error.
    async fn on_error(&self, message: String);

    /// Terminate the stream normally.
    async fn on_completed(&self);

    /// True once the consumer has dropped its flow; the pump drops
    /// further frames for a disposed slot.
    fn is_disposed(&self) -> bool;
}

/// A flow that emits a single value, then completes.
pub fn once<T: Send + 'static>(value: T) -> Flow<T> {
    Box::pin(stream::once(async move { Ok(value) }))
}

/// The empty flow: completes immediately.
pub fn empty<T: Send + 'static>() -> Flow<T> {
    Box::pin(stream::empty())
}

/// A flow that immediately terminates with an error.
pub fn throw<T: Send + 'static>(error: Error) -> Flow<T> {
    Box::pin(stream::once(async move { Err(error) }))
}

/// A flow over a fixed set of values, then completion.
pub fn iter<T, I>(values: I) -> Flow<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(values.into_iter().map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_once_emits_then_completes() {
        let mut flow = once(7);
        assert_eq!(flow.next().await.unwrap().unwrap(), 7);
        assert!(flow.next().await.is_none());
    }

    #[tokio::test]
    async fn test_throw_is_terminal() {
        let mut flow: Flow<i32> = throw(Error::Method("nope".into()));
        assert!(flow.next().await.unwrap().is_err());
        assert!(flow.next().await.is_none());
    }

    #[tokio::test]
    async fn test_iter_preserves_order() {
        let collected: Vec<i32> = iter(vec![1, 2, 3])
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec![1, 2, 3]);
    }
}
