//! Single-subscription proxy
//!
//! A one-shot sequence: delivery blocks until the consumer first polls
//! the flow, and dropping the flow fires a disposal signal that the demux
//! pump observes. Exclusivity is enforced by ownership - the flow is a
//! moved value, so a second subscription cannot be expressed.
//!
//! Unlike the queued subject, nothing is buffered ahead of attachment;
//! the delivery side waits instead.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::error::{Error, Result};

use super::{Flow, Observer};

/// Shared attach/dispose state between handle and stream.
struct ProxyState {
    /// Set on the flow's first poll.
    attached: AtomicBool,
    /// Set when the flow is dropped.
    disposed: AtomicBool,
    /// Wakes delivery waiting for either of the above.
    signal: Notify,
}

/// Delivery handle of a single-subscription proxy.
/// Create with [`SingleSubscriberProxy::channel`].
pub struct SingleSubscriberProxy<T> {
    tx: Mutex<Option<UnboundedSender<Result<T>>>>,
    terminated: AtomicBool,
    state: Arc<ProxyState>,
}

impl<T: Send + 'static> SingleSubscriberProxy<T> {
    /// Create a proxy and the flow it feeds.
    pub fn channel() -> (Self, Flow<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(ProxyState {
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            signal: Notify::new(),
        });
        let proxy = Self {
            tx: Mutex::new(Some(tx)),
            terminated: AtomicBool::new(false),
            state: Arc::clone(&state),
        };
        let flow = Box::pin(ProxyStream { rx, state, done: false });
        (proxy, flow)
    }

    /// Wait until the consumer attaches (first poll) or disposes.
    ///
    /// Returns true when attached, false when the flow was dropped first.
    async fn await_subscriber(&self) -> bool {
        loop {
            let notified = self.state.signal.notified();
            if self.state.attached.load(Ordering::SeqCst) {
                return true;
            }
            if self.state.disposed.load(Ordering::SeqCst) {
                return false;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Observer<T> for SingleSubscriberProxy<T> {
    async fn on_next(&self, item: T) {
        if self.terminated.load(Ordering::SeqCst) || !self.await_subscriber().await {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Ok(item));
        }
    }

    async fn on_error(&self, message: String) {
        if self.terminated.swap(true, Ordering::SeqCst) || !self.await_subscriber().await {
            return;
        }
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Err(Error::Remote(message)));
        }
    }

    async fn on_completed(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) || !self.await_subscriber().await {
            return;
        }
        self.tx.lock().take();
    }

    fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }
}

/// Consumer side of a proxy. Signals attachment on first poll and
/// disposal on drop.
struct ProxyStream<T> {
    rx: UnboundedReceiver<Result<T>>,
    state: Arc<ProxyState>,
    done: bool,
}

impl<T: Send> Stream for ProxyStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.state.attached.swap(true, Ordering::SeqCst) {
            this.state.signal.notify_waiters();
        }
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl<T> Drop for ProxyStream<T> {
    fn drop(&mut self) {
        self.state.disposed.store(true, Ordering::SeqCst);
        self.state.signal.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_delivery_waits_for_attachment() {
        let (proxy, mut flow) = SingleSubscriberProxy::channel();
        let proxy = Arc::new(proxy);

        let sender = {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                proxy.on_next(42).await;
                proxy.on_completed().await;
            })
        };

        // The sender cannot finish until the flow is polled.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sender.is_finished());

        assert_eq!(flow.next().await.unwrap().unwrap(), 42);
        assert!(flow.next().await.is_none());
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_dispose_unblocks_delivery() {
        let (proxy, flow) = SingleSubscriberProxy::<i32>::channel();

        drop(flow);
        assert!(proxy.is_disposed());

        // Must not hang: the disposal signal releases the waiter.
        proxy.on_next(1).await;
        proxy.on_completed().await;
    }

    #[tokio::test]
    async fn test_error_then_end() {
        let (proxy, mut flow) = SingleSubscriberProxy::<i32>::channel();
        let proxy = Arc::new(proxy);

        let sender = {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                proxy.on_next(1).await;
                proxy.on_error("bad".into()).await;
            })
        };

        assert_eq!(flow.next().await.unwrap().unwrap(), 1);
        assert!(matches!(flow.next().await, Some(Err(Error::Remote(_)))));
        assert!(flow.next().await.is_none());
        sender.await.unwrap();
    }
}
