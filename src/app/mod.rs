//! Application layer
//!
//! Everything above the drivers: the dispatch middleware, the bundled
//! HTTP/1.1 host, and the metrics surface.

pub mod metrics;
pub mod middleware;
pub mod server;

pub use middleware::{Dispatch, Middleware, RequestHead};
pub use server::{Fallback, Server};
