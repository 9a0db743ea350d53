//! WebSocket connection driver
//!
//! Drives one upgraded connection: builds the inbound slots, invokes the
//! route, then runs two pumps concurrently until both finish.
//!
//! ```text
//! peer frames → adapter.receive → demux pump → named slots → method
//! method outbound flow → outbound pump → adapter.send → peer
//! ```
//!
//! The outbound pump alone performs the close handshake; the inbound
//! pump never closes the socket. The driver awaits both pumps before the
//! adapter is released.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::app::metrics;
use crate::common::Scalars;
use crate::flow::{self, Flow, Observer};
use crate::registry::{InboundFn, Route};
use crate::socket::SocketAdapter;
use crate::wire::{self, FrameKind, InboundFrame};

use super::SlotBacking;

/// Run one WebSocket connection to completion.
pub async fn drive(
    route: &Arc<Route>,
    adapter: Arc<SocketAdapter>,
    scalars: Scalars,
    backing: SlotBacking,
    cancel: CancellationToken,
) {
    let mut slots: HashMap<String, Arc<dyn Observer<String>>> = HashMap::new();
    let mut flows: HashMap<String, Flow<String>> = HashMap::new();
    for name in &route.inbound_params {
        let (observer, flow) = backing.create();
        slots.insert(name.clone(), observer);
        flows.insert(name.clone(), flow);
    }

    // Each flow is handed out exactly once; unknown names and repeated
    // lookups get the empty sequence.
    let flows = Arc::new(Mutex::new(flows));
    let inbound: InboundFn = {
        let flows = Arc::clone(&flows);
        Arc::new(move |name| flows.lock().remove(name).unwrap_or_else(flow::empty))
    };

    let controller = (route.factory)();
    let outbound = (route.invoker)(controller, scalars, inbound);

    metrics::ws_opened();
    debug!("[{}] connection open ({} inbound slots)", route.path, slots.len());

    tokio::join!(
        outbound_pump(&adapter, outbound, &cancel),
        inbound_pump(&adapter, slots, &cancel),
    );

    metrics::ws_closed();
    debug!("[{}] connection done", route.path);
}

/// Serialize the method's outbound sequence onto the socket.
async fn outbound_pump(
    adapter: &SocketAdapter,
    mut outbound: Flow<String>,
    cancel: &CancellationToken,
) {
    loop {
        if adapter.is_closed() {
            break;
        }
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = outbound.next() => item,
        };
        match item {
            Some(Ok(value)) => {
                if adapter.send(wire::encode_next(&value)).await.is_err() {
                    break;
                }
                metrics::frame_sent();
            }
            Some(Err(e)) => {
                metrics::method_error();
                let _ = adapter.send(wire::encode_error(&e.wire_message())).await;
                break;
            }
            None => {
                if !adapter.is_closed() {
                    let _ = adapter.send(wire::encode_complete()).await;
                    adapter.close(wire::CLOSE_REASON).await;
                }
                break;
            }
        }
    }
}

/// Demultiplex peer frames onto the named inbound slots.
async fn inbound_pump(
    adapter: &SocketAdapter,
    mut slots: HashMap<String, Arc<dyn Observer<String>>>,
    cancel: &CancellationToken,
) {
    while !adapter.is_closed() && !slots.is_empty() {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = adapter.receive() => message,
        };
        let Some(message) = message else { break };
        metrics::frame_received();

        let Some(frame) = InboundFrame::parse(&message) else {
            trace!("dropping malformed frame: {:?}", message);
            continue;
        };
        let Some(slot) = slots.get(frame.name).cloned() else {
            trace!("dropping frame for unknown stream: {}", frame.name);
            continue;
        };
        if slot.is_disposed() {
            continue;
        }

        let terminal = tokio::select! {
            _ = cancel.cancelled() => break,
            terminal = dispatch(&slot, frame.kind, frame.payload) => terminal,
        };
        if terminal {
            slots.remove(frame.name);
        }
    }

    // Connection is going away: surviving slots complete so the method
    // does not wait on input that can no longer arrive.
    for (_, slot) in slots {
        if !slot.is_disposed() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = slot.on_completed() => {}
            }
        }
    }
}

/// Deliver one frame. Returns true when the slot terminated.
async fn dispatch(slot: &Arc<dyn Observer<String>>, kind: FrameKind, payload: &str) -> bool {
    match kind {
        FrameKind::Next => {
            slot.on_next(payload.to_string()).await;
            false
        }
        FrameKind::Error => {
            slot.on_error(payload.to_string()).await;
            true
        }
        FrameKind::Complete => {
            slot.on_completed().await;
            true
        }
        FrameKind::Final => {
            slot.on_next(payload.to_string()).await;
            slot.on_completed().await;
            true
        }
    }
}
