//! Queued-until-subscribed subject
//!
//! Every event pushed before the flow's first poll is buffered; the first
//! consumer drains the buffer in order and then receives events directly.
//! A terminal event present in the buffer is replayed like any other.
//!
//! This is the default backing for inbound parameter slots: the peer may
//! start sending frames before the controller method gets around to
//! polling the parameter, and nothing must be lost in between.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};

use super::{Flow, Observer};

/// Delivery handle of a queued subject. Create with [`QueuedSubject::channel`].
pub struct QueuedSubject<T> {
    tx: Mutex<Option<UnboundedSender<Result<T>>>>,
    terminated: AtomicBool,
}

impl<T: Send + 'static> QueuedSubject<T> {
    /// Create a subject and the flow it feeds.
    pub fn channel() -> (Self, Flow<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subject = Self {
            tx: Mutex::new(Some(tx)),
            terminated: AtomicBool::new(false),
        };
        let flow = Box::pin(SubjectStream { rx, done: false });
        (subject, flow)
    }

    /// True once a terminal event has been delivered.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> Observer<T> for QueuedSubject<T> {
    async fn on_next(&self, item: T) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Ok(item));
        }
    }

    async fn on_error(&self, message: String) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender after the error closes the channel, so the
        // consumer sees the error followed by end-of-stream.
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Err(Error::Remote(message)));
        }
    }

    async fn on_completed(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tx.lock().take();
    }

    fn is_disposed(&self) -> bool {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| tx.is_closed())
            .unwrap_or(false)
    }
}

/// Consumer side of a [`QueuedSubject`]. Ends after yielding an error.
struct SubjectStream<T> {
    rx: UnboundedReceiver<Result<T>>,
    done: bool,
}

impl<T: Send> Stream for SubjectStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
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
