//! HTTP connection driver
//!
//! Projects a method's outbound sequence onto one chunked HTTP response.
//! Headers stay pending until the first event decides them:
//!
//! ```text
//! first value        → 200, chunked application/json, write, flush
//! error, no output   → 500, error text as body
//! error after output → error text appended in-band (headers are sent)
//! completion, empty  → 204, no body
//! ```
//!
//! Every write goes through the write scheduler, so chunks from one
//! response never interleave. Host cancellation disposes the outbound
//! subscription and lets the scheduler drain what is already queued.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::app::metrics;
use crate::common::Scalars;
use crate::flow;
use crate::registry::{InboundFn, Route};

use super::WriteScheduler;

/// Write side of one HTTP response, owned by the host.
///
/// `write_head` is called exactly once per response; `has_body` selects
/// between a chunked body and a bodiless (204-style) response.
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    async fn write_head(&self, status: u16, has_body: bool) -> std::io::Result<()>;
    async fn write_chunk(&self, data: Vec<u8>) -> std::io::Result<()>;
    async fn flush(&self) -> std::io::Result<()>;
}

/// Run one plain-HTTP request to completion.
pub async fn drive(
    route: &Arc<Route>,
    scalars: Scalars,
    channel: Arc<dyn ResponseChannel>,
    cancel: CancellationToken,
) {
    let controller = (route.factory)();
    // No inbound streams over plain HTTP.
    let inbound: InboundFn = Arc::new(|_| flow::empty());
    let mut outbound = (route.invoker)(controller, scalars, inbound);

    let scheduler = Arc::new(WriteScheduler::new());
    // Fired when a write fails: the peer is gone, abandon the rest.
    let write_failed = CancellationToken::new();

    let pump = async {
        let mut wrote_any = false;
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("[{}] request cancelled", route.path);
                    scheduler.complete();
                    break;
                }
                item = outbound.next() => item,
            };
            match item {
                Some(Ok(value)) => {
                    let first = !wrote_any;
                    wrote_any = true;
                    let channel = Arc::clone(&channel);
                    let failed = write_failed.clone();
                    scheduler.schedule(async move {
                        let result = async {
                            if first {
                                channel.write_head(200, true).await?;
                            }
                            channel.write_chunk(value.into_bytes()).await?;
                            channel.flush().await
                        }
                        .await;
                        if result.is_err() {
                            failed.cancel();
                        }
                    });
                }
                Some(Err(e)) => {
                    metrics::method_error();
                    let message = e.wire_message();
                    let status = if wrote_any { None } else { Some(500) };
                    let channel = Arc::clone(&channel);
                    let failed = write_failed.clone();
                    scheduler.schedule(async move {
                        let result = async {
                            if let Some(status) = status {
                                channel.write_head(status, true).await?;
                            }
                            channel.write_chunk(message.into_bytes()).await?;
                            channel.flush().await
                        }
                        .await;
                        if result.is_err() {
                            failed.cancel();
                        }
                    });
                    scheduler.complete();
                    break;
                }
                None => {
                    if !wrote_any {
                        let channel = Arc::clone(&channel);
                        scheduler.schedule(async move {
                            let _ = channel.write_head(204, false).await;
                        });
                    }
                    scheduler.complete();
                    break;
                }
            }
        }
    };

    tokio::join!(scheduler.run(write_failed.clone()), pump);
    metrics::http_request();
}
