//! Streamium - streaming controller endpoints over WebSockets and HTTP
//!
//! # Architecture
//!
//! ```text
//! peer frames → SocketAdapter → inbound demux pump → named slots
//!                                                        ↓
//!                              Registry → Invoker → controller method
//!                                                        ↓
//! peer ← SocketAdapter ← outbound pump ← serialized outbound flow
//! ```
//!
//! Registered controller methods return a lazy asynchronous sequence
//! ([`Flow`]) and may take named inbound sequences as parameters. The
//! framework routes requests by exact URL path, binds scalar and body
//! parameters, and drives the method's outbound sequence back to the
//! peer: over WebSockets with a compact line-oriented frame protocol, or
//! over plain HTTP as a chunked `application/json` response.
//!
//! ## Core Principles
//!
//! - Routing plans are compiled once at registry build; no per-call
//!   reflection
//! - Per-connection state lives in the drivers; the registry is
//!   immutable and shared
//! - One task per pump per connection; writes on one HTTP response are
//!   serialized by a scheduler
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Io, Scalars
//! ├── wire.rs          # Frame grammar and protocol constants
//! ├── flow/            # Flow sequences, subject and proxy primitives
//! ├── socket.rs        # WebSocket adapter facade
//! ├── registry/        # Descriptors, binding rules, compiled invokers
//! ├── driver/          # WebSocket and HTTP connection drivers
//! └── app/             # Middleware entry, bundled host, metrics
//! ```

// Core types
pub mod common;
pub mod error;

// Protocol and primitives
pub mod flow;
pub mod socket;
pub mod wire;

// Dispatch engine
pub mod driver;
pub mod registry;

// Application layer
pub mod app;
pub mod config;

// Re-exports for convenience
pub use common::{Io, Scalars, BODY_KEY};
pub use config::Config;
pub use error::{Error, Result};
pub use flow::{Flow, Observer};

// Architecture re-exports
pub use app::{Dispatch, Middleware, RequestHead, Server};
pub use driver::{ResponseChannel, SlotBacking, WriteScheduler};
pub use registry::{
    Binding, CallContext, ControllerDescriptor, MethodDescriptor, ParamSpec, Registry,
};
pub use socket::SocketAdapter;
