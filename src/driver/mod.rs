//! Connection drivers
//!
//! One driver per transport style:
//! - WebSocket: bidirectional, one outbound pump and one inbound demux
//!   pump per connection
//! - HTTP: outbound only, projected onto a chunked response through the
//!   write scheduler
//!
//! Both consume a matched [`Route`](crate::registry::Route) plus the
//! bound scalar map, and never outlive their connection.

pub mod http;
pub mod scheduler;
pub mod websocket;

pub use http::ResponseChannel;
pub use scheduler::WriteScheduler;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::flow::{Flow, Observer, QueuedSubject, SingleSubscriberProxy};

/// Which stream primitive backs the inbound parameter slots.
///
/// The queued subject is the default: frames the peer sends before the
/// method polls a parameter are buffered, never lost. The single
/// subscriber proxy blocks delivery until the first poll instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotBacking {
    #[default]
    Queued,
    Single,
}

impl SlotBacking {
    /// Create one inbound slot: the delivery side for the demux pump and
    /// the flow handed to the controller method.
    pub fn create(&self) -> (Arc<dyn Observer<String>>, Flow<String>) {
        match self {
            SlotBacking::Queued => {
                let (subject, flow) = QueuedSubject::channel();
                (Arc::new(subject), flow)
            }
            SlotBacking::Single => {
                let (proxy, flow) = SingleSubscriberProxy::channel();
                (Arc::new(proxy), flow)
            }
        }
    }
}
